//! Wallet-signed authentication statements (`AuthSig`).

use crate::config::{Config, SiweSettings};
use crate::siwe::{generate_nonce, SiweError, SiweMessage};
use crate::wallet::{recover_signer, Address, SigningError, Wallet};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Derivation tag carried by every personal-sign authentication statement.
pub const DERIVED_VIA: &str = "web3.eth.personal.sign";

/// Proof that the holder of `address` signed `signed_message`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSig {
    /// `0x`-prefixed hex of the 65 byte `r || s || v` signature.
    pub sig: String,
    /// Signature scheme tag, always [`DERIVED_VIA`].
    pub derived_via: String,
    /// Exact text that was signed.
    pub signed_message: String,
    /// EIP-55 checksummed signer address.
    pub address: String,
}

/// Reasons an [`AuthSig`] fails verification.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unsupported derivation method: {0}")]
    /// `derivedVia` is not [`DERIVED_VIA`].
    UnsupportedDerivation(String),
    #[error("invalid signature encoding: {0}")]
    /// `sig` is not valid hex.
    Encoding(String),
    #[error("invalid address: {0}")]
    /// `address` does not parse.
    Address(String),
    #[error(transparent)]
    /// Signature could not be recovered.
    Signature(#[from] SigningError),
    #[error("signed message is not a valid SIWE message: {0}")]
    /// The signed text is not EIP-4361.
    Message(#[from] SiweError),
    #[error("signature was produced by {recovered}, not {claimed}")]
    /// Recovered signer differs from the claimed address.
    SignerMismatch {
        /// Address in the auth sig.
        claimed: Address,
        /// Address recovered from the signature.
        recovered: Address,
    },
    #[error("signed message names {0}, not the signing address")]
    /// The SIWE body names a different account.
    MessageAddressMismatch(Address),
    #[error("signed message is expired or not yet valid")]
    /// Outside the message's validity window.
    Expired,
}

/// Source of SIWE nonces.
pub type NonceSource = Box<dyn Fn() -> String + Send + Sync>;

/// Builds and signs SIWE authentication statements for one wallet.
pub struct Signer {
    wallet: Wallet,
    settings: SiweSettings,
    nonce: NonceSource,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("wallet", &self.wallet)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Signer {
    /// Creates a signer from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, SigningError> {
        let wallet = Wallet::from_secret_bytes(config.private_key.expose())?;
        Ok(Self {
            wallet,
            settings: config.siwe.clone(),
            nonce: Box::new(generate_nonce),
        })
    }

    /// Replaces the nonce generator.
    pub fn with_nonce_source(mut self, source: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.nonce = Box::new(source);
        self
    }

    /// Address of the signing wallet.
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Builds the SIWE message that would be signed at `now`.
    pub fn message_at(&self, now: DateTime<Utc>) -> Result<SiweMessage, SigningError> {
        let expiration_time = i64::try_from(self.settings.ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                SigningError::Timestamp(format!(
                    "{now} + {}s overflows",
                    self.settings.ttl_secs
                ))
            })?;
        Ok(SiweMessage {
            domain: self.settings.domain.clone(),
            address: self.wallet.address(),
            statement: Some(self.settings.statement.clone()),
            uri: self.settings.origin.clone(),
            version: "1".to_string(),
            chain_id: self.settings.chain_id,
            nonce: (self.nonce)(),
            issued_at: now,
            expiration_time: Some(expiration_time),
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        })
    }

    /// Signs a fresh statement valid from now for the configured lifetime.
    pub fn auth_sig(&self) -> Result<AuthSig, SigningError> {
        self.auth_sig_at(Utc::now())
    }

    /// Signs a statement issued at `now`.
    pub fn auth_sig_at(&self, now: DateTime<Utc>) -> Result<AuthSig, SigningError> {
        let message = self.message_at(now)?.prepare_message();
        let signature = self.wallet.sign_message(message.as_bytes())?;
        tracing::debug!(address = %self.wallet.address(), "signed auth statement");
        Ok(AuthSig {
            sig: format!("0x{}", hex::encode(signature)),
            derived_via: DERIVED_VIA.to_string(),
            signed_message: message,
            address: self.wallet.address().to_checksum(),
        })
    }
}

/// Verifies an auth sig at the current time.
pub fn verify_auth_sig(auth: &AuthSig) -> Result<SiweMessage, AuthError> {
    verify_auth_sig_at(auth, Utc::now())
}

/// Verifies the signature, the address binding and the validity window of
/// `auth` at `now`, returning the parsed SIWE message.
pub fn verify_auth_sig_at(auth: &AuthSig, now: DateTime<Utc>) -> Result<SiweMessage, AuthError> {
    if auth.derived_via != DERIVED_VIA {
        return Err(AuthError::UnsupportedDerivation(auth.derived_via.clone()));
    }
    let claimed = Address::parse(&auth.address)
        .ok_or_else(|| AuthError::Address(auth.address.clone()))?;
    let raw = auth.sig.trim();
    let sig_hex = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    let sig = hex::decode(sig_hex).map_err(|err| AuthError::Encoding(err.to_string()))?;
    let recovered = recover_signer(auth.signed_message.as_bytes(), &sig)?;
    if recovered != claimed {
        return Err(AuthError::SignerMismatch { claimed, recovered });
    }
    let message = SiweMessage::parse(&auth.signed_message)?;
    if message.address != claimed {
        return Err(AuthError::MessageAddressMismatch(message.address));
    }
    if !message.is_valid_at(now) {
        return Err(AuthError::Expired);
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::config_with_key;
    use chrono::TimeZone;

    fn fixed_signer() -> Signer {
        Signer::new(&config_with_key(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        ))
        .unwrap()
        .with_nonce_source(|| "litsealnonce0001".to_string())
    }

    #[test]
    fn generated_auth_sig_verifies() {
        let signer = fixed_signer();
        let auth = signer.auth_sig().unwrap();
        assert_eq!(auth.derived_via, DERIVED_VIA);
        assert_eq!(auth.address, "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        let msg = verify_auth_sig(&auth).unwrap();
        assert_eq!(msg.address, signer.address());
        assert_eq!(msg.chain_id, 11155111);
    }

    #[test]
    fn statements_differ_only_in_timestamps() {
        let signer = fixed_signer();
        let t0 = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
        let a = signer.auth_sig_at(t0).unwrap();
        let b = signer.auth_sig_at(t0 + Duration::minutes(5)).unwrap();
        assert_ne!(a.signed_message, b.signed_message);
        assert_ne!(a.sig, b.sig);
        for (la, lb) in a.signed_message.lines().zip(b.signed_message.lines()) {
            if la != lb {
                assert!(
                    la.starts_with("Issued At: ") || la.starts_with("Expiration Time: "),
                    "unexpected difference in line {la:?}"
                );
            }
        }
        assert_eq!(a.signed_message.lines().count(), b.signed_message.lines().count());
    }

    #[test]
    fn expiration_is_one_hour_after_issue() {
        let signer = fixed_signer();
        let t0 = Utc.with_ymd_and_hms(2026, 10, 17, 9, 0, 0).unwrap();
        let msg = signer.message_at(t0).unwrap();
        assert_eq!(msg.expiration_time, Some(t0 + Duration::hours(1)));
    }

    #[test]
    fn unrepresentable_expiry_is_a_signing_error() {
        let mut config = config_with_key(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        );
        for ttl in [10_000_000_000_000, u64::MAX] {
            config.siwe.ttl_secs = ttl;
            let signer = Signer::new(&config).unwrap();
            assert!(matches!(
                signer.auth_sig(),
                Err(SigningError::Timestamp(_))
            ));
        }
    }

    #[test]
    fn tampered_message_is_rejected() {
        let mut auth = fixed_signer().auth_sig().unwrap();
        auth.signed_message = auth.signed_message.replace("test statement", "evil statement");
        assert!(matches!(
            verify_auth_sig(&auth),
            Err(AuthError::SignerMismatch { .. }) | Err(AuthError::Signature(_))
        ));
    }

    #[test]
    fn expired_statement_is_rejected() {
        let signer = fixed_signer();
        let issued = Utc::now() - Duration::hours(3);
        let auth = signer.auth_sig_at(issued).unwrap();
        assert!(matches!(verify_auth_sig(&auth), Err(AuthError::Expired)));
    }

    #[test]
    fn wrong_derivation_tag_is_rejected() {
        let mut auth = fixed_signer().auth_sig().unwrap();
        auth.derived_via = "ed25519".to_string();
        assert!(matches!(
            verify_auth_sig(&auth),
            Err(AuthError::UnsupportedDerivation(_))
        ));
    }

    #[test]
    fn serializes_with_wire_names() {
        let auth = fixed_signer().auth_sig().unwrap();
        let value = serde_json::to_value(&auth).unwrap();
        assert_eq!(value["derivedVia"], DERIVED_VIA);
        assert!(value["signedMessage"].as_str().unwrap().starts_with("localhost wants"));
        assert!(value["sig"].as_str().unwrap().starts_with("0x"));
        assert_eq!(value["sig"].as_str().unwrap().len(), 2 + 130);
    }
}
