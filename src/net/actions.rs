use crate::conditions::DEMO_ACTION_CID;
use crate::wallet::Address;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Caller facts available to an action while it runs.
#[derive(Debug, Clone)]
pub struct ActionContext {
    /// Wallet that authenticated the request.
    pub user_address: Address,
    /// Chain named by the condition.
    pub chain: String,
}

/// A Lit Action evaluated natively by the local network. Returns the string
/// result that the condition's `returnValueTest` is applied to.
pub trait LitAction: Send + Sync {
    /// Invokes `method` with positional `params`.
    fn call(&self, method: &str, params: &[String], ctx: &ActionContext) -> Result<String, String>;
}

impl<F> LitAction for F
where
    F: Fn(&str, &[String], &ActionContext) -> Result<String, String> + Send + Sync,
{
    fn call(&self, method: &str, params: &[String], ctx: &ActionContext) -> Result<String, String> {
        self(method, params, ctx)
    }
}

/// Actions keyed by their `ipfs://` locator.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn LitAction>>,
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.actions.keys().collect();
        keys.sort();
        f.debug_struct("ActionRegistry").field("actions", &keys).finish()
    }
}

impl ActionRegistry {
    /// Registry preloaded with the demo action.
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        registry.register(DEMO_ACTION_CID, demo_go_action);
        registry
    }

    /// Adds or replaces the action at `locator`.
    pub fn register(&mut self, locator: impl Into<String>, action: impl LitAction + 'static) {
        self.actions.insert(locator.into(), Arc::new(action));
    }

    /// Looks up an action.
    pub fn get(&self, locator: &str) -> Option<Arc<dyn LitAction>> {
        self.actions.get(locator).cloned()
    }
}

/// `go(n)`: `"true"` when `n` is a positive integer, `"false"` otherwise.
fn demo_go_action(method: &str, params: &[String], _ctx: &ActionContext) -> Result<String, String> {
    if method != "go" {
        return Err(format!("unknown method {method}"));
    }
    let arg = params
        .first()
        .ok_or_else(|| "go expects one parameter".to_string())?;
    let positive = arg.trim().parse::<u64>().map(|n| n > 0).unwrap_or(false);
    Ok(positive.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ActionContext {
        ActionContext {
            user_address: Address::from_bytes([1u8; 20]),
            chain: "ethereum".to_string(),
        }
    }

    #[test]
    fn demo_action_registered() {
        let registry = ActionRegistry::with_defaults();
        let action = registry.get(DEMO_ACTION_CID).expect("demo action");
        assert_eq!(action.call("go", &["100".to_string()], &ctx()).unwrap(), "true");
        assert_eq!(action.call("go", &["0".to_string()], &ctx()).unwrap(), "false");
        assert!(action.call("stop", &[], &ctx()).is_err());
        assert!(registry.get("ipfs://unknown").is_none());
    }

    #[test]
    fn closures_register_as_actions() {
        let mut registry = ActionRegistry::default();
        registry.register("ipfs://echo", |_: &str, params: &[String], _: &ActionContext| {
            Ok(params.join(","))
        });
        let out = registry
            .get("ipfs://echo")
            .unwrap()
            .call("any", &["a".to_string(), "b".to_string()], &ctx())
            .unwrap();
        assert_eq!(out, "a,b");
    }
}
