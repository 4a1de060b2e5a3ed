use crate::auth::AuthSig;
use crate::conditions::AccessControlConditions;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

/// JSON-RPC error code for a body that is not JSON.
pub const CODE_PARSE_ERROR: i64 = -32700;
/// JSON-RPC error code for a request the server does not accept.
pub const CODE_INVALID_REQUEST: i64 = -32600;
/// JSON-RPC error code for malformed parameters.
pub const CODE_INVALID_PARAMS: i64 = -32602;
/// JSON-RPC error code for an unknown method.
pub const CODE_METHOD_NOT_FOUND: i64 = -32601;
/// Generic server-side failure.
pub const CODE_INTERNAL: i64 = -32000;
/// Auth sig rejected.
pub const CODE_UNAUTHORIZED: i64 = -32001;
/// Access control conditions evaluated to false.
pub const CODE_CONDITION_NOT_MET: i64 = -32002;
/// Ciphertext could not be opened.
pub const CODE_DECRYPTION_FAILED: i64 = -32003;

/// `lit_handshake` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeResult {
    /// Network label.
    pub network_id: String,
    /// Server version.
    pub version: String,
}

/// `lit_encrypt` parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptParams {
    /// Conditions the ciphertext is bound to.
    pub access_control_conditions: AccessControlConditions,
    /// Chain name.
    pub chain: String,
    /// Base64 plaintext.
    pub data_to_encrypt: String,
    /// Caller's authentication.
    pub auth_sig: AuthSig,
}

/// `lit_encrypt` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptResult {
    /// Base64 ciphertext.
    pub ciphertext: String,
    /// Hex SHA-256 of the plaintext.
    pub data_to_encrypt_hash: String,
}

/// `lit_decrypt` parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptParams {
    /// Conditions used at encryption time.
    pub access_control_conditions: AccessControlConditions,
    /// Chain name.
    pub chain: String,
    /// Base64 ciphertext.
    pub ciphertext: String,
    /// Hex SHA-256 of the plaintext.
    pub data_to_encrypt_hash: String,
    /// Caller's authentication.
    pub auth_sig: AuthSig,
}

/// `lit_decrypt` result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptResult {
    /// Base64 plaintext.
    pub decrypted_data: String,
}

/// Base64 encoding used for binary fields.
pub fn encode_bytes(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Inverse of [`encode_bytes`].
pub fn decode_bytes(input: &str) -> Result<Vec<u8>, String> {
    BASE64.decode(input.trim()).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_use_camel_case() {
        let value = serde_json::to_value(EncryptResult {
            ciphertext: encode_bytes(b"abc"),
            data_to_encrypt_hash: "00".to_string(),
        })
        .unwrap();
        assert_eq!(value["ciphertext"], "YWJj");
        assert_eq!(value["dataToEncryptHash"], "00");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_bytes("***").is_err());
        assert_eq!(decode_bytes(" YWJj ").unwrap(), b"abc");
    }
}
