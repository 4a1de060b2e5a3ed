//! Access-control condition documents and their canonical hashing.
//!
//! A condition list is an ordered sequence of conditions joined by boolean
//! operators:
//!
//! ```json
//! [
//!   {"contractAddress": "ipfs://Qm...", "standardContractType": "LitAction",
//!    "chain": "ethereum", "method": "go", "parameters": ["100"],
//!    "returnValueTest": {"comparator": "=", "value": "true"}},
//!   {"operator": "and"},
//!   {...}
//! ]
//! ```
//!
//! The SHA-256 of the canonical JSON encoding identifies the list. Encryption
//! is bound to that hash, so decrypting requires the byte-identical list.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Plaintext encrypted by the round-trip runner.
pub const DEMO_PLAINTEXT: &str = "This is a secret message";
/// IPFS locator of the Lit Action guarding the demo secret.
pub const DEMO_ACTION_CID: &str = "ipfs://QmcgbVu2sJSPpTeFhBd174FnmYmoVYvUFJeDkS7eYtwoFY";
/// Condition type tag for Lit Action conditions.
pub const LIT_ACTION_TYPE: &str = "LitAction";
/// Parameter placeholder replaced with the authenticated wallet address.
pub const USER_ADDRESS_PARAM: &str = ":userAddress";

/// Errors raised by malformed condition documents.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("condition list is empty")]
    /// No conditions supplied.
    Empty,
    #[error("entry {0}: expected a condition")]
    /// An operator appeared where a condition was required.
    ExpectedCondition(usize),
    #[error("entry {0}: expected an operator")]
    /// Two conditions appeared without an operator between them.
    ExpectedOperator(usize),
    #[error("condition list must end with a condition")]
    /// Trailing operator.
    TrailingOperator,
    #[error("entry {index}: {reason}")]
    /// A field of a condition is invalid.
    InvalidCondition {
        /// Offending entry.
        index: usize,
        /// Detail.
        reason: String,
    },
    #[error("condition list could not be encoded: {0}")]
    /// Canonical serialization failed.
    Encoding(String),
}

/// Expected-result clause of a condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnValueTest {
    /// Comparison operator (`=`, `!=`, `>`, `>=`, `<`, `<=`, `contains`).
    pub comparator: String,
    /// Value the evaluated result is compared against.
    pub value: String,
}

/// A single declarative access rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCondition {
    /// Resource locator: a contract address or an `ipfs://` action.
    pub contract_address: String,
    /// Condition type, e.g. `LitAction`, or empty for a plain parameter test.
    pub standard_contract_type: String,
    /// Chain name the condition is evaluated against.
    pub chain: String,
    /// Method invoked on the resource.
    pub method: String,
    /// Positional method arguments.
    pub parameters: Vec<String>,
    /// How the result is judged.
    pub return_value_test: ReturnValueTest,
}

/// Boolean joiner between conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoolOperator {
    /// Both sides must hold.
    And,
    /// Either side must hold.
    Or,
}

/// Operator entry as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorEntry {
    /// The joiner.
    pub operator: BoolOperator,
}

/// One element of a condition list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionEntry {
    /// A boolean joiner.
    Operator(OperatorEntry),
    /// A rule.
    Condition(AccessCondition),
}

/// Ordered, immutable list of conditions shared by encrypt and decrypt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessControlConditions(Vec<ConditionEntry>);

impl AccessControlConditions {
    /// Wraps and validates a list of entries.
    pub fn new(entries: Vec<ConditionEntry>) -> Result<Self, ConditionError> {
        let conditions = Self(entries);
        conditions.validate()?;
        Ok(conditions)
    }

    /// A list holding exactly one condition.
    pub fn single(condition: AccessCondition) -> Result<Self, ConditionError> {
        Self::new(vec![ConditionEntry::Condition(condition)])
    }

    /// Entries in evaluation order.
    pub fn entries(&self) -> &[ConditionEntry] {
        &self.0
    }

    /// Checks structure (condition, operator, condition, ...) and field sanity.
    pub fn validate(&self) -> Result<(), ConditionError> {
        if self.0.is_empty() {
            return Err(ConditionError::Empty);
        }
        for (index, entry) in self.0.iter().enumerate() {
            match (index % 2 == 0, entry) {
                (true, ConditionEntry::Condition(cond)) => validate_condition(index, cond)?,
                (true, ConditionEntry::Operator(_)) => {
                    return Err(ConditionError::ExpectedCondition(index))
                }
                (false, ConditionEntry::Operator(_)) => {}
                (false, ConditionEntry::Condition(_)) => {
                    return Err(ConditionError::ExpectedOperator(index))
                }
            }
        }
        if self.0.len() % 2 == 0 {
            return Err(ConditionError::TrailingOperator);
        }
        Ok(())
    }

    /// Canonical JSON encoding used for hashing.
    pub fn canonical_json(&self) -> Result<Vec<u8>, ConditionError> {
        // Struct field order is fixed, so serde_json output is deterministic.
        serde_json::to_vec(&self.0).map_err(|err| ConditionError::Encoding(err.to_string()))
    }

    /// SHA-256 of the canonical encoding.
    pub fn hash(&self) -> Result<[u8; 32], ConditionError> {
        Ok(Sha256::digest(self.canonical_json()?).into())
    }

    /// Lowercase hex of [`Self::hash`].
    pub fn hash_hex(&self) -> Result<String, ConditionError> {
        self.hash().map(hex::encode)
    }

    /// Evaluates the list left to right, combining condition outcomes with
    /// their operators. `eval` decides a single condition.
    pub fn evaluate_with<E, F>(&self, mut eval: F) -> Result<bool, E>
    where
        F: FnMut(&AccessCondition) -> Result<bool, E>,
    {
        let mut acc: Option<bool> = None;
        let mut pending = BoolOperator::And;
        for entry in &self.0 {
            match entry {
                ConditionEntry::Operator(op) => pending = op.operator,
                ConditionEntry::Condition(cond) => {
                    let outcome = eval(cond)?;
                    acc = Some(match (acc, pending) {
                        (None, _) => outcome,
                        (Some(prev), BoolOperator::And) => prev && outcome,
                        (Some(prev), BoolOperator::Or) => prev || outcome,
                    });
                }
            }
        }
        Ok(acc.unwrap_or(false))
    }
}

fn validate_condition(index: usize, cond: &AccessCondition) -> Result<(), ConditionError> {
    let invalid = |reason: &str| ConditionError::InvalidCondition {
        index,
        reason: reason.to_string(),
    };
    if cond.chain.trim().is_empty() {
        return Err(invalid("chain must not be empty"));
    }
    if cond.standard_contract_type == LIT_ACTION_TYPE && !cond.contract_address.starts_with("ipfs://")
    {
        return Err(invalid("LitAction conditions need an ipfs:// locator"));
    }
    Comparator::from_str(&cond.return_value_test.comparator)
        .map_err(|_| invalid("unknown comparator"))?;
    Ok(())
}

/// Comparison operators understood by [`ReturnValueTest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// `=`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `contains`
    Contains,
}

impl FromStr for Comparator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" | "==" => Ok(Self::Eq),
            "!=" => Ok(Self::Ne),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            "contains" => Ok(Self::Contains),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Contains => "contains",
        })
    }
}

impl Comparator {
    /// Judges `actual` against `expected`. Integers compare numerically,
    /// `0x` hex strings case-insensitively, everything else byte-wise.
    /// Ordering comparators never hold for non-numeric operands.
    pub fn holds(self, actual: &str, expected: &str) -> bool {
        if self == Self::Contains {
            return actual.contains(expected);
        }
        if let (Ok(a), Ok(b)) = (actual.trim().parse::<i128>(), expected.trim().parse::<i128>()) {
            let ord = a.cmp(&b);
            return match self {
                Self::Eq => ord == Ordering::Equal,
                Self::Ne => ord != Ordering::Equal,
                Self::Gt => ord == Ordering::Greater,
                Self::Ge => ord != Ordering::Less,
                Self::Lt => ord == Ordering::Less,
                Self::Le => ord != Ordering::Greater,
                Self::Contains => false,
            };
        }
        let equal = if is_hex_string(actual) && is_hex_string(expected) {
            actual.eq_ignore_ascii_case(expected)
        } else {
            actual == expected
        };
        match self {
            Self::Eq => equal,
            Self::Ne => !equal,
            _ => false,
        }
    }
}

fn is_hex_string(value: &str) -> bool {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .map(|raw| !raw.is_empty() && raw.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or(false)
}

/// The condition guarding the demo secret: the IPFS-hosted Lit Action's `go`
/// method, called with `100`, must return `true`.
pub fn demo_conditions() -> AccessControlConditions {
    AccessControlConditions(vec![ConditionEntry::Condition(AccessCondition {
        contract_address: DEMO_ACTION_CID.to_string(),
        standard_contract_type: LIT_ACTION_TYPE.to_string(),
        chain: "ethereum".to_string(),
        method: "go".to_string(),
        parameters: vec!["100".to_string()],
        return_value_test: ReturnValueTest {
            comparator: "=".to_string(),
            value: "true".to_string(),
        },
    })])
}

/// A plain condition satisfied only when the authenticated wallet is `address`.
pub fn wallet_owner_condition(address: &str, chain: &str) -> AccessCondition {
    AccessCondition {
        contract_address: String::new(),
        standard_contract_type: String::new(),
        chain: chain.to_string(),
        method: String::new(),
        parameters: vec![USER_ADDRESS_PARAM.to_string()],
        return_value_test: ReturnValueTest {
            comparator: "=".to_string(),
            value: address.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_conditions_are_valid() {
        let conds = demo_conditions();
        assert!(conds.validate().is_ok());
        assert_eq!(conds.entries().len(), 1);
    }

    #[test]
    fn wire_format_matches_documented_names() {
        let json = String::from_utf8(demo_conditions().canonical_json().unwrap()).unwrap();
        assert_eq!(
            json,
            "[{\"contractAddress\":\"ipfs://QmcgbVu2sJSPpTeFhBd174FnmYmoVYvUFJeDkS7eYtwoFY\",\
\"standardContractType\":\"LitAction\",\"chain\":\"ethereum\",\"method\":\"go\",\
\"parameters\":[\"100\"],\"returnValueTest\":{\"comparator\":\"=\",\"value\":\"true\"}}]"
        );
    }

    #[test]
    fn decode_mixed_entries() {
        let raw = r#"[
            {"contractAddress":"","standardContractType":"","chain":"ethereum","method":"",
             "parameters":[":userAddress"],"returnValueTest":{"comparator":"=","value":"0xabc"}},
            {"operator":"or"},
            {"contractAddress":"ipfs://Qm1","standardContractType":"LitAction","chain":"ethereum",
             "method":"go","parameters":[],"returnValueTest":{"comparator":"=","value":"true"}}
        ]"#;
        let conds: AccessControlConditions = serde_json::from_str(raw).unwrap();
        assert!(conds.validate().is_ok());
        assert!(matches!(
            conds.entries()[1],
            ConditionEntry::Operator(OperatorEntry {
                operator: BoolOperator::Or
            })
        ));
    }

    #[test]
    fn hash_changes_with_any_field() {
        let base = demo_conditions();
        let mut entries = base.entries().to_vec();
        if let ConditionEntry::Condition(cond) = &mut entries[0] {
            cond.parameters[0] = "101".to_string();
        }
        let altered = AccessControlConditions::new(entries).unwrap();
        assert_ne!(base.hash().unwrap(), altered.hash().unwrap());
        assert_eq!(
            base.hash_hex().unwrap(),
            demo_conditions().hash_hex().unwrap()
        );
        let digest: [u8; 32] = Sha256::digest(base.canonical_json().unwrap()).into();
        assert_eq!(base.hash().unwrap(), digest);
    }

    #[test]
    fn structure_is_enforced() {
        let cond = ConditionEntry::Condition(wallet_owner_condition("0x1", "ethereum"));
        let op = ConditionEntry::Operator(OperatorEntry {
            operator: BoolOperator::And,
        });
        assert_eq!(
            AccessControlConditions::new(vec![]).unwrap_err(),
            ConditionError::Empty
        );
        assert_eq!(
            AccessControlConditions::new(vec![op.clone()]).unwrap_err(),
            ConditionError::ExpectedCondition(0)
        );
        assert_eq!(
            AccessControlConditions::new(vec![cond.clone(), cond.clone()]).unwrap_err(),
            ConditionError::ExpectedOperator(1)
        );
        assert_eq!(
            AccessControlConditions::new(vec![cond.clone(), op]).unwrap_err(),
            ConditionError::TrailingOperator
        );
    }

    #[test]
    fn lit_action_needs_ipfs_locator() {
        let mut cond = match &demo_conditions().entries()[0] {
            ConditionEntry::Condition(c) => c.clone(),
            ConditionEntry::Operator(_) => unreachable!(),
        };
        cond.contract_address = "0x1234".to_string();
        assert!(matches!(
            AccessControlConditions::single(cond),
            Err(ConditionError::InvalidCondition { index: 0, .. })
        ));
    }

    #[test]
    fn comparators() {
        assert!(Comparator::Eq.holds("true", "true"));
        assert!(!Comparator::Eq.holds("true", "false"));
        assert!(Comparator::Gt.holds("101", "100"));
        assert!(Comparator::Ge.holds("100", "100"));
        assert!(Comparator::Lt.holds("-1", "0"));
        assert!(!Comparator::Gt.holds("abc", "abd"));
        assert!(Comparator::Ne.holds("a", "b"));
        assert!(Comparator::Eq.holds("0xABcd", "0xabcd"));
        assert!(Comparator::Contains.holds("hello world", "lo w"));
        assert_eq!("<=".parse::<Comparator>(), Ok(Comparator::Le));
        assert!("~".parse::<Comparator>().is_err());
    }

    #[test]
    fn operators_combine_left_to_right() {
        let owner = |addr: &str| ConditionEntry::Condition(wallet_owner_condition(addr, "ethereum"));
        let or = ConditionEntry::Operator(OperatorEntry {
            operator: BoolOperator::Or,
        });
        let and = ConditionEntry::Operator(OperatorEntry {
            operator: BoolOperator::And,
        });
        let conds =
            AccessControlConditions::new(vec![owner("0xa"), or, owner("0xb"), and, owner("0xc")])
                .unwrap();
        let eval = |truthy: &'static [&'static str]| {
            conds
                .evaluate_with::<(), _>(|c| Ok(truthy.contains(&c.return_value_test.value.as_str())))
                .unwrap()
        };
        assert!(eval(&["0xa", "0xc"]));
        assert!(!eval(&["0xa"]));
        assert!(eval(&["0xb", "0xc"]));
    }
}
