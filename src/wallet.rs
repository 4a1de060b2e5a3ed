//! secp256k1 wallet helpers: Ethereum address derivation, EIP-55 checksums and
//! EIP-191 `personal_sign` signatures.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;

/// Length of an `r || s || v` personal-sign signature.
pub const SIGNATURE_LENGTH: usize = 65;

const PERSONAL_SIGN_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Errors produced while signing or recovering wallet signatures.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid private key: {0}")]
    /// Secret bytes are not a valid secp256k1 scalar.
    InvalidKey(String),
    #[error("signing failed: {0}")]
    /// The signing primitive rejected the message.
    Sign(String),
    #[error("malformed signature: {0}")]
    /// Signature bytes could not be decoded.
    Malformed(String),
    #[error("signer recovery failed: {0}")]
    /// Public key recovery from the signature failed.
    Recovery(String),
    #[error("statement timestamp out of range: {0}")]
    /// The statement's validity window cannot be represented.
    Timestamp(String),
}

/// Twenty byte Ethereum account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    /// Wraps raw address bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derives the address controlled by `key`.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        let digest = keccak256(&point.as_bytes()[1..]);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Self(out)
    }

    /// Parses a `0x`-prefixed hex address. Mixed-case input must carry a valid
    /// EIP-55 checksum; all-lower or all-upper input is accepted as is.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let raw = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))?;
        if raw.len() != 40 || !raw.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(raw, &mut bytes).ok()?;
        let address = Self(bytes);
        let has_lower = raw.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = raw.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && address.to_checksum()[2..] != *raw {
            return None;
        }
        Some(address)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Lowercase `0x` hex rendering.
    pub fn to_lower_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// EIP-55 mixed-case checksum rendering.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = keccak256(lower.as_bytes());
        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (idx, ch) in lower.chars().enumerate() {
            let nibble = (hash[idx / 2] >> (if idx % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_checksum())
    }
}

/// A secp256k1 signing key together with its derived address.
#[derive(Clone)]
pub struct Wallet {
    signing: SigningKey,
    address: Address,
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Builds a wallet from 32 secret bytes.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self, SigningError> {
        let signing = SigningKey::from_slice(secret)
            .map_err(|err| SigningError::InvalidKey(err.to_string()))?;
        let address = Address::from_verifying_key(signing.verifying_key());
        Ok(Self { signing, address })
    }

    /// Address controlled by this wallet.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Signs `message` with EIP-191 `personal_sign` semantics and returns the
    /// `r || s || v` bytes with `v` in `{27, 28}`.
    pub fn sign_message(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LENGTH], SigningError> {
        let digest = personal_message_hash(message);
        let (signature, recid) = self
            .signing
            .sign_prehash_recoverable(&digest)
            .map_err(|err| SigningError::Sign(err.to_string()))?;
        let mut out = [0u8; SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + recid.to_byte();
        Ok(out)
    }
}

/// Recovers the address that produced a personal-sign `signature` over `message`.
pub fn recover_signer(message: &[u8], signature: &[u8]) -> Result<Address, SigningError> {
    if signature.len() != SIGNATURE_LENGTH {
        return Err(SigningError::Malformed(format!(
            "expected {SIGNATURE_LENGTH} bytes, got {}",
            signature.len()
        )));
    }
    let sig = Signature::from_slice(&signature[..64])
        .map_err(|err| SigningError::Malformed(err.to_string()))?;
    let v = match signature[64] {
        v @ 27..=28 => v - 27,
        v @ 0..=1 => v,
        other => {
            return Err(SigningError::Malformed(format!(
                "invalid recovery byte {other}"
            )))
        }
    };
    let recid = RecoveryId::from_byte(v)
        .ok_or_else(|| SigningError::Malformed("invalid recovery id".to_string()))?;
    let digest = personal_message_hash(message);
    let key = VerifyingKey::recover_from_prehash(&digest, &sig, recid)
        .map_err(|err| SigningError::Recovery(err.to_string()))?;
    Ok(Address::from_verifying_key(&key))
}

/// Keccak-256 of the EIP-191 prefixed message.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(PERSONAL_SIGN_PREFIX.as_bytes());
    hasher.update(message.len().to_string().as_bytes());
    hasher.update(message);
    hasher.finalize().into()
}

/// Keccak-256 digest.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (anvil/hardhat account #0).
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn dev_wallet() -> Wallet {
        let mut secret = [0u8; 32];
        hex::decode_to_slice(DEV_KEY, &mut secret).unwrap();
        Wallet::from_secret_bytes(&secret).unwrap()
    }

    #[test]
    fn derives_checksummed_address() {
        assert_eq!(dev_wallet().address().to_checksum(), DEV_ADDRESS);
    }

    #[test]
    fn checksum_matches_eip55_vector() {
        let addr = Address::parse("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(
            addr.to_checksum(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn parse_rejects_bad_checksum() {
        assert!(Address::parse("0x5AAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").is_none());
        assert!(Address::parse("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").is_none());
        assert!(Address::parse("0x5aaeb6053f").is_none());
    }

    #[test]
    fn personal_hash_matches_known_vector() {
        // keccak256("\x19Ethereum Signed Message:\n5hello")
        assert_eq!(
            hex::encode(personal_message_hash(b"hello")),
            "50b2c43fd39106bafbba0da34fc430e1f91e3c96ea2acee2bc34119f92b37750"
        );
    }

    #[test]
    fn signature_recovers_signer() {
        let wallet = dev_wallet();
        let sig = wallet.sign_message(b"sign me").unwrap();
        assert!(sig[64] == 27 || sig[64] == 28);
        assert_eq!(recover_signer(b"sign me", &sig).unwrap(), wallet.address());
        assert_ne!(
            recover_signer(b"sign you", &sig).ok(),
            Some(wallet.address())
        );
    }

    #[test]
    fn zero_key_is_rejected() {
        assert!(matches!(
            Wallet::from_secret_bytes(&[0u8; 32]),
            Err(SigningError::InvalidKey(_))
        ));
    }

    #[test]
    fn short_signature_is_malformed() {
        assert!(matches!(
            recover_signer(b"x", &[0u8; 10]),
            Err(SigningError::Malformed(_))
        ));
    }
}
