use super::{
    ActionContext, ActionRegistry, ConditionNetwork, DecryptRequest, EncryptRequest,
    EncryptedPayload, NetworkError, NetworkSession,
};
use crate::auth::verify_auth_sig;
use crate::conditions::{
    AccessCondition, AccessControlConditions, Comparator, LIT_ACTION_TYPE, USER_ADDRESS_PARAM,
};
use crate::wallet::Address;
use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const KEY_SALT: &[u8] = b"litseal-local-network-v1";
const NONCE_LEN: usize = 12;

/// In-process condition network backed by one symmetric master secret.
///
/// Ciphertexts are sealed with a key derived from the master secret and the
/// identity `lit-accesscontrolcondition://{conditions_hash}/{data_hash}`, so a
/// different condition list or hash derives a different key and decryption
/// fails. Decryption additionally verifies the auth sig and evaluates the
/// conditions for the authenticated wallet.
#[derive(Clone)]
pub struct LocalNetwork {
    inner: Arc<Inner>,
}

struct Inner {
    master: [u8; 32],
    actions: ActionRegistry,
}

impl fmt::Debug for LocalNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalNetwork")
            .field("actions", &self.inner.actions)
            .finish_non_exhaustive()
    }
}

impl Default for LocalNetwork {
    fn default() -> Self {
        Self::new(ActionRegistry::with_defaults())
    }
}

impl LocalNetwork {
    /// Network with a fresh random master secret.
    pub fn new(actions: ActionRegistry) -> Self {
        let mut master = [0u8; 32];
        OsRng.fill_bytes(&mut master);
        Self::with_master_secret(master, actions)
    }

    /// Network with a caller-chosen master secret; ciphertexts survive restarts.
    pub fn with_master_secret(master: [u8; 32], actions: ActionRegistry) -> Self {
        Self {
            inner: Arc::new(Inner { master, actions }),
        }
    }
}

#[async_trait]
impl ConditionNetwork for LocalNetwork {
    async fn connect(&self) -> Result<Box<dyn NetworkSession>, NetworkError> {
        tracing::debug!(network = self.name(), "session opened");
        Ok(Box::new(LocalSession {
            inner: Arc::clone(&self.inner),
            open: AtomicBool::new(true),
        }))
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

struct LocalSession {
    inner: Arc<Inner>,
    open: AtomicBool,
}

impl LocalSession {
    fn ensure_open(&self) -> Result<(), NetworkError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(NetworkError::Connection("session closed".to_string()))
        }
    }
}

#[async_trait]
impl NetworkSession for LocalSession {
    async fn encrypt(&self, req: EncryptRequest<'_>) -> Result<EncryptedPayload, NetworkError> {
        self.ensure_open()?;
        check_chain(req.chain).map_err(NetworkError::Encryption)?;
        req.conditions
            .validate()
            .map_err(|err| NetworkError::Encryption(err.to_string()))?;
        verify_auth_sig(req.auth_sig)
            .map_err(|err| NetworkError::Encryption(format!("auth sig rejected: {err}")))?;

        let data_hash = hex::encode(Sha256::digest(req.data));
        let identity = identity(req.conditions, &data_hash).map_err(NetworkError::Encryption)?;
        let cipher = self.inner.cipher(&identity)?;
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: req.data,
                    aad: identity.as_bytes(),
                },
            )
            .map_err(|err| NetworkError::Encryption(err.to_string()))?;

        let mut ciphertext = Vec::with_capacity(NONCE_LEN + sealed.len());
        ciphertext.extend_from_slice(&nonce);
        ciphertext.extend_from_slice(&sealed);
        tracing::debug!(%identity, bytes = ciphertext.len(), "sealed payload");
        Ok(EncryptedPayload {
            ciphertext,
            data_to_encrypt_hash: data_hash,
        })
    }

    async fn decrypt(&self, req: DecryptRequest<'_>) -> Result<Vec<u8>, NetworkError> {
        self.ensure_open()?;
        check_chain(req.chain).map_err(NetworkError::Decryption)?;
        let message = verify_auth_sig(req.auth_sig)
            .map_err(|err| NetworkError::Unauthorized(err.to_string()))?;
        req.conditions
            .validate()
            .map_err(|err| NetworkError::Decryption(err.to_string()))?;

        let granted = self.inner.evaluate(req.conditions, message.address)?;
        if !granted {
            tracing::info!(address = %message.address, "conditions not met");
            return Err(NetworkError::ConditionNotMet);
        }

        let payload = req.payload;
        if payload.ciphertext.len() <= NONCE_LEN {
            return Err(NetworkError::Decryption("ciphertext too short".to_string()));
        }
        let identity = identity(req.conditions, &payload.data_to_encrypt_hash)
            .map_err(NetworkError::Decryption)?;
        let cipher = self.inner.cipher(&identity)?;
        let (nonce, sealed) = payload.ciphertext.split_at(NONCE_LEN);
        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: identity.as_bytes(),
                },
            )
            .map_err(|_| {
                NetworkError::Decryption(
                    "ciphertext does not match the conditions or data hash".to_string(),
                )
            })?;
        if hex::encode(Sha256::digest(&plaintext)) != payload.data_to_encrypt_hash {
            return Err(NetworkError::Decryption("data hash mismatch".to_string()));
        }
        Ok(plaintext)
    }

    async fn disconnect(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            tracing::debug!("session closed");
        }
    }
}

impl Inner {
    fn cipher(&self, identity: &str) -> Result<ChaCha20Poly1305, NetworkError> {
        let hk = Hkdf::<Sha256>::new(Some(KEY_SALT), &self.master);
        let mut key = [0u8; 32];
        hk.expand(identity.as_bytes(), &mut key)
            .map_err(|err| NetworkError::Encryption(format!("key derivation: {err}")))?;
        Ok(ChaCha20Poly1305::new(Key::from_slice(&key)))
    }

    fn evaluate(
        &self,
        conditions: &AccessControlConditions,
        user: Address,
    ) -> Result<bool, NetworkError> {
        conditions.evaluate_with(|cond| self.evaluate_one(cond, user))
    }

    fn evaluate_one(&self, cond: &AccessCondition, user: Address) -> Result<bool, NetworkError> {
        let params: Vec<String> = cond
            .parameters
            .iter()
            .map(|p| {
                if p == USER_ADDRESS_PARAM {
                    user.to_checksum()
                } else {
                    p.clone()
                }
            })
            .collect();
        let returned = match cond.standard_contract_type.as_str() {
            LIT_ACTION_TYPE => {
                let action = self.actions.get(&cond.contract_address).ok_or_else(|| {
                    NetworkError::Decryption(format!(
                        "unknown lit action {}",
                        cond.contract_address
                    ))
                })?;
                let ctx = ActionContext {
                    user_address: user,
                    chain: cond.chain.clone(),
                };
                action
                    .call(&cond.method, &params, &ctx)
                    .map_err(|err| NetworkError::Decryption(format!("lit action failed: {err}")))?
            }
            "" if cond.method.is_empty() => params.first().cloned().unwrap_or_default(),
            other => {
                return Err(NetworkError::Decryption(format!(
                    "unsupported condition type {other:?}"
                )))
            }
        };
        let comparator: Comparator = cond
            .return_value_test
            .comparator
            .parse()
            .map_err(|_| NetworkError::Decryption("unknown comparator".to_string()))?;
        Ok(comparator.holds(&returned, &cond.return_value_test.value))
    }
}

fn identity(conditions: &AccessControlConditions, data_hash: &str) -> Result<String, String> {
    let conditions_hash = conditions.hash_hex().map_err(|err| err.to_string())?;
    Ok(format!(
        "lit-accesscontrolcondition://{conditions_hash}/{data_hash}"
    ))
}

fn check_chain(chain: &str) -> Result<(), String> {
    if chain.trim().is_empty() {
        return Err("chain must not be empty".to_string());
    }
    Ok(())
}
