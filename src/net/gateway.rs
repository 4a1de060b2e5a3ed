use super::wire::{
    decode_bytes, encode_bytes, DecryptParams, DecryptResult, EncryptParams, EncryptResult,
    HandshakeResult, CODE_CONDITION_NOT_MET, CODE_DECRYPTION_FAILED, CODE_UNAUTHORIZED,
};
use super::{
    ConditionNetwork, DecryptRequest, EncryptRequest, EncryptedPayload, NetworkError,
    NetworkSession,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Condition network reached over JSON-RPC 2.0 on HTTP.
#[derive(Debug, Clone)]
pub struct GatewayNetwork {
    endpoint: String,
    client: Client,
}

impl GatewayNetwork {
    /// Builds a client for `endpoint` with a per-request `timeout`.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| NetworkError::Connection(format!("http client: {err}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    /// Gateway URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ConditionNetwork for GatewayNetwork {
    async fn connect(&self) -> Result<Box<dyn NetworkSession>, NetworkError> {
        let session = GatewaySession {
            endpoint: self.endpoint.clone(),
            client: self.client.clone(),
            next_id: AtomicU64::new(1),
            open: AtomicBool::new(true),
        };
        let hello: HandshakeResult = session
            .call("lit_handshake", json!([]))
            .await
            .map_err(|err| NetworkError::Connection(err.to_string()))?;
        tracing::info!(
            endpoint = %self.endpoint,
            network = %hello.network_id,
            version = %hello.version,
            "connected to gateway"
        );
        Ok(Box::new(session))
    }

    fn name(&self) -> &'static str {
        "gateway"
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug)]
enum CallError {
    Transport(String),
    Rpc { code: i64, message: String },
    Decode(String),
}

impl std::fmt::Display for CallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(err) => write!(f, "transport: {err}"),
            Self::Rpc { code, message } => write!(f, "rpc error {code}: {message}"),
            Self::Decode(err) => write!(f, "decode: {err}"),
        }
    }
}

struct GatewaySession {
    endpoint: String,
    client: Client,
    next_id: AtomicU64,
    open: AtomicBool,
}

impl GatewaySession {
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, CallError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|err| CallError::Transport(err.to_string()))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|err| CallError::Transport(err.to_string()))?;
        let parsed: RpcResponse = serde_json::from_str(&text).map_err(|err| {
            CallError::Decode(format!("status={status} body={text:?}: {err}"))
        })?;
        if let Some(err) = parsed.error {
            return Err(CallError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let result = parsed
            .result
            .ok_or_else(|| CallError::Decode("response carries neither result nor error".into()))?;
        serde_json::from_value(result).map_err(|err| CallError::Decode(err.to_string()))
    }

    fn ensure_open(&self) -> Result<(), NetworkError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(NetworkError::Connection("session closed".to_string()))
        }
    }
}

fn decrypt_error(err: CallError) -> NetworkError {
    match err {
        CallError::Rpc { code, message } if code == CODE_UNAUTHORIZED => {
            NetworkError::Unauthorized(message)
        }
        CallError::Rpc { code, .. } if code == CODE_CONDITION_NOT_MET => {
            NetworkError::ConditionNotMet
        }
        CallError::Rpc { code, message } if code == CODE_DECRYPTION_FAILED => {
            NetworkError::Decryption(message)
        }
        other => NetworkError::Decryption(other.to_string()),
    }
}

#[async_trait]
impl NetworkSession for GatewaySession {
    async fn encrypt(&self, req: EncryptRequest<'_>) -> Result<EncryptedPayload, NetworkError> {
        self.ensure_open()?;
        let params = EncryptParams {
            access_control_conditions: req.conditions.clone(),
            chain: req.chain.to_string(),
            data_to_encrypt: encode_bytes(req.data),
            auth_sig: req.auth_sig.clone(),
        };
        let result: EncryptResult = self
            .call("lit_encrypt", json!([params]))
            .await
            .map_err(|err| NetworkError::Encryption(err.to_string()))?;
        let ciphertext = decode_bytes(&result.ciphertext)
            .map_err(|err| NetworkError::Encryption(format!("ciphertext encoding: {err}")))?;
        Ok(EncryptedPayload {
            ciphertext,
            data_to_encrypt_hash: result.data_to_encrypt_hash,
        })
    }

    async fn decrypt(&self, req: DecryptRequest<'_>) -> Result<Vec<u8>, NetworkError> {
        self.ensure_open()?;
        let params = DecryptParams {
            access_control_conditions: req.conditions.clone(),
            chain: req.chain.to_string(),
            ciphertext: encode_bytes(&req.payload.ciphertext),
            data_to_encrypt_hash: req.payload.data_to_encrypt_hash.clone(),
            auth_sig: req.auth_sig.clone(),
        };
        let result: DecryptResult = self
            .call("lit_decrypt", json!([params]))
            .await
            .map_err(decrypt_error)?;
        decode_bytes(&result.decrypted_data)
            .map_err(|err| NetworkError::Decryption(format!("plaintext encoding: {err}")))
    }

    async fn disconnect(&self) {
        self.open.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_codes_map_to_network_errors() {
        let rpc = |code| CallError::Rpc {
            code,
            message: "m".to_string(),
        };
        assert_eq!(
            decrypt_error(rpc(CODE_UNAUTHORIZED)),
            NetworkError::Unauthorized("m".to_string())
        );
        assert_eq!(
            decrypt_error(rpc(CODE_CONDITION_NOT_MET)),
            NetworkError::ConditionNotMet
        );
        assert_eq!(
            decrypt_error(rpc(CODE_DECRYPTION_FAILED)),
            NetworkError::Decryption("m".to_string())
        );
        assert!(decrypt_error(CallError::Transport("down".into())).is_decryption());
    }

    #[tokio::test]
    async fn unreachable_gateway_is_connection_error() {
        // Port 9 (discard) on loopback is not expected to speak HTTP.
        let network =
            GatewayNetwork::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            network.connect().await,
            Err(NetworkError::Connection(_))
        ));
    }
}
