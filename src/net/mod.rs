//! Condition-network collaborators.
//!
//! A [`ConditionNetwork`] hands out [`NetworkSession`]s; a session encrypts
//! data under an access-control condition list and decrypts it again once the
//! network has re-evaluated the conditions for the presented auth sig. The
//! crate ships an in-process development network and a JSON-RPC gateway
//! client; the devnode server exposes the former through the latter's
//! protocol.

#![cfg(feature = "net")]

/// Native Lit Action handlers used by the local network.
pub mod actions;
/// JSON-RPC client for a remote condition gateway.
pub mod gateway;
/// In-process development network.
pub mod local;
/// JSON-RPC server exposing a local network (devnode).
pub mod rpc;
/// JSON-RPC parameter and result documents.
pub mod wire;

use crate::auth::AuthSig;
use crate::conditions::AccessControlConditions;
use async_trait::async_trait;
use thiserror::Error;

pub use actions::{ActionContext, ActionRegistry, LitAction};
pub use gateway::GatewayNetwork;
pub use local::LocalNetwork;
pub use rpc::{run_devnode, serve_devnode, DevnodeConfig};

/// Errors surfaced by a condition network.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("connection failed: {0}")]
    /// No session could be established, or the session is closed.
    Connection(String),
    #[error("encryption failed: {0}")]
    /// The network refused or failed to encrypt.
    Encryption(String),
    #[error("decryption failed: {0}")]
    /// Ciphertext, hash and conditions do not line up, or the network failed.
    Decryption(String),
    #[error("auth sig rejected: {0}")]
    /// The presented auth sig did not verify.
    Unauthorized(String),
    #[error("access control conditions not met")]
    /// Conditions evaluated to false for the authenticated wallet.
    ConditionNotMet,
}

impl NetworkError {
    /// Whether this error belongs to the decryption failure class.
    pub fn is_decryption(&self) -> bool {
        matches!(
            self,
            Self::Decryption(_) | Self::Unauthorized(_) | Self::ConditionNotMet
        )
    }
}

/// Output of an encrypt call, consumed unmodified by decrypt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Opaque ciphertext bytes.
    pub ciphertext: Vec<u8>,
    /// Lowercase hex SHA-256 of the plaintext.
    pub data_to_encrypt_hash: String,
}

/// Arguments of an encrypt call.
#[derive(Debug, Clone, Copy)]
pub struct EncryptRequest<'a> {
    /// Conditions the ciphertext is bound to.
    pub conditions: &'a AccessControlConditions,
    /// Chain name.
    pub chain: &'a str,
    /// Plaintext bytes.
    pub data: &'a [u8],
    /// Caller's authentication.
    pub auth_sig: &'a AuthSig,
}

/// Arguments of a decrypt call.
#[derive(Debug, Clone, Copy)]
pub struct DecryptRequest<'a> {
    /// Conditions used at encryption time.
    pub conditions: &'a AccessControlConditions,
    /// Chain name.
    pub chain: &'a str,
    /// Payload returned by encrypt.
    pub payload: &'a EncryptedPayload,
    /// Caller's authentication.
    pub auth_sig: &'a AuthSig,
}

/// Entry point to a condition network.
#[async_trait]
pub trait ConditionNetwork: Send + Sync {
    /// Establishes a session.
    async fn connect(&self) -> Result<Box<dyn NetworkSession>, NetworkError>;

    /// Human-friendly label for logging.
    fn name(&self) -> &'static str;
}

/// An established connection to a condition network.
#[async_trait]
pub trait NetworkSession: Send + Sync {
    /// Encrypts `req.data` under `req.conditions`.
    async fn encrypt(&self, req: EncryptRequest<'_>) -> Result<EncryptedPayload, NetworkError>;

    /// Decrypts a payload after the network re-evaluates the conditions.
    async fn decrypt(&self, req: DecryptRequest<'_>) -> Result<Vec<u8>, NetworkError>;

    /// Releases the session. Later calls fail with [`NetworkError::Connection`].
    async fn disconnect(&self);
}

#[cfg(test)]
mod tests {
    use super::NetworkError;

    #[test]
    fn decryption_class() {
        assert!(NetworkError::ConditionNotMet.is_decryption());
        assert!(NetworkError::Unauthorized("x".into()).is_decryption());
        assert!(NetworkError::Decryption("x".into()).is_decryption());
        assert!(!NetworkError::Encryption("x".into()).is_decryption());
        assert!(!NetworkError::Connection("x".into()).is_decryption());
    }
}
