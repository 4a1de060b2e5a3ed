//! Devnode: a JSON-RPC facade that serves a [`LocalNetwork`] to gateway
//! clients.

use super::wire::{
    decode_bytes, encode_bytes, DecryptParams, DecryptResult, EncryptParams, EncryptResult,
    HandshakeResult, CODE_CONDITION_NOT_MET, CODE_DECRYPTION_FAILED, CODE_INTERNAL,
    CODE_INVALID_PARAMS, CODE_INVALID_REQUEST, CODE_METHOD_NOT_FOUND, CODE_PARSE_ERROR,
    CODE_UNAUTHORIZED,
};
use super::{
    ConditionNetwork, DecryptRequest, EncryptRequest, EncryptedPayload, LocalNetwork,
    NetworkError,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io;
use std::net::SocketAddr;
use std::str;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;

const MAX_HEADER_BYTES: usize = 32 * 1024;
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const NETWORK_ID: &str = "litseal-devnode";

struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    method: String,
    #[serde(default)]
    params: Value,
    id: Option<Value>,
}

#[derive(Debug, PartialEq, Eq)]
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: CODE_INVALID_PARAMS,
            message: message.into(),
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: CODE_METHOD_NOT_FOUND,
            message: format!("method not found: {method}"),
        }
    }
}

impl From<NetworkError> for RpcError {
    fn from(err: NetworkError) -> Self {
        let code = match &err {
            NetworkError::Unauthorized(_) => CODE_UNAUTHORIZED,
            NetworkError::ConditionNotMet => CODE_CONDITION_NOT_MET,
            NetworkError::Decryption(_) => CODE_DECRYPTION_FAILED,
            NetworkError::Connection(_) | NetworkError::Encryption(_) => CODE_INTERNAL,
        };
        let message = match err {
            NetworkError::Unauthorized(msg) | NetworkError::Decryption(msg) => msg,
            other => other.to_string(),
        };
        Self { code, message }
    }
}

/// Devnode listener configuration.
#[derive(Debug, Clone)]
pub struct DevnodeConfig {
    /// Socket address where the devnode listens.
    pub listen: SocketAddr,
    /// Max request read timeout.
    pub request_timeout: Duration,
}

impl DevnodeConfig {
    /// Build a config using the default read timeout.
    pub fn new(listen: SocketAddr) -> Self {
        Self {
            listen,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

/// Binds `cfg.listen` and serves `network` until the process exits.
pub async fn run_devnode(cfg: DevnodeConfig, network: LocalNetwork) -> io::Result<()> {
    let listener = TcpListener::bind(cfg.listen).await?;
    serve_devnode(listener, cfg.request_timeout, network).await
}

/// Serves `network` on an already bound listener.
pub async fn serve_devnode(
    listener: TcpListener,
    request_timeout: Duration,
    network: LocalNetwork,
) -> io::Result<()> {
    tracing::info!(addr = %listener.local_addr()?, "devnode listening");
    loop {
        let (mut stream, peer) = listener.accept().await?;
        let network = network.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_connection(&mut stream, request_timeout, &network).await {
                tracing::warn!(%peer, "devnode connection error: {err}");
            }
        });
    }
}

async fn handle_connection(
    stream: &mut TcpStream,
    request_timeout: Duration,
    network: &LocalNetwork,
) -> io::Result<()> {
    let (status, body) = match read_request(stream, request_timeout).await {
        Ok(req) => route(req, network).await,
        Err(err) => (
            "400 Bad Request",
            error_body(Value::Null, CODE_PARSE_ERROR, &format!("parse error: {err}")),
        ),
    };
    stream.write_all(&json_response(status, &body)).await?;
    stream.shutdown().await
}

async fn route(req: HttpRequest, network: &LocalNetwork) -> (&'static str, String) {
    match (req.method.as_str(), req.path.as_str()) {
        ("GET", "/healthz") => {
            let body = json!({
                "status": "ok",
                "service": NETWORK_ID,
                "version": env!("CARGO_PKG_VERSION"),
            });
            ("200 OK", body.to_string())
        }
        ("POST", _) => {
            let call: JsonRpcRequest = match serde_json::from_slice(&req.body) {
                Ok(call) => call,
                Err(err) => {
                    let message = format!("parse error: {err}");
                    return (
                        "400 Bad Request",
                        error_body(Value::Null, CODE_PARSE_ERROR, &message),
                    );
                }
            };
            let id = call.id.clone().unwrap_or(Value::Null);
            let body = match handle_rpc_method(&call, network).await {
                Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string(),
                Err(err) => {
                    tracing::debug!(
                        method = %call.method,
                        code = err.code,
                        "rpc error: {}",
                        err.message
                    );
                    error_body(id, err.code, &err.message)
                }
            };
            ("200 OK", body)
        }
        _ => (
            "405 Method Not Allowed",
            error_body(Value::Null, CODE_INVALID_REQUEST, "expected POST or GET /healthz"),
        ),
    }
}

async fn handle_rpc_method(
    req: &JsonRpcRequest,
    network: &LocalNetwork,
) -> Result<Value, RpcError> {
    match req.method.as_str() {
        "lit_handshake" => to_value(HandshakeResult {
            network_id: NETWORK_ID.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
        "lit_encrypt" => {
            let params: EncryptParams = rpc_param(&req.params, 0)?;
            let data = decode_bytes(&params.data_to_encrypt)
                .map_err(|err| RpcError::invalid_params(format!("dataToEncrypt: {err}")))?;
            let session = network.connect().await?;
            let outcome = session
                .encrypt(EncryptRequest {
                    conditions: &params.access_control_conditions,
                    chain: &params.chain,
                    data: &data,
                    auth_sig: &params.auth_sig,
                })
                .await;
            session.disconnect().await;
            let payload = outcome?;
            to_value(EncryptResult {
                ciphertext: encode_bytes(&payload.ciphertext),
                data_to_encrypt_hash: payload.data_to_encrypt_hash,
            })
        }
        "lit_decrypt" => {
            let params: DecryptParams = rpc_param(&req.params, 0)?;
            let payload = EncryptedPayload {
                ciphertext: decode_bytes(&params.ciphertext)
                    .map_err(|err| RpcError::invalid_params(format!("ciphertext: {err}")))?,
                data_to_encrypt_hash: params.data_to_encrypt_hash.clone(),
            };
            let session = network.connect().await?;
            let outcome = session
                .decrypt(DecryptRequest {
                    conditions: &params.access_control_conditions,
                    chain: &params.chain,
                    payload: &payload,
                    auth_sig: &params.auth_sig,
                })
                .await;
            session.disconnect().await;
            let plaintext = outcome?;
            to_value(DecryptResult {
                decrypted_data: encode_bytes(&plaintext),
            })
        }
        other => Err(RpcError::method_not_found(other)),
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| RpcError {
        code: CODE_INTERNAL,
        message: err.to_string(),
    })
}

fn rpc_param<T: DeserializeOwned>(params: &Value, index: usize) -> Result<T, RpcError> {
    let value = params
        .as_array()
        .and_then(|arr| arr.get(index))
        .cloned()
        .ok_or_else(|| RpcError::invalid_params(format!("missing param {index}")))?;
    serde_json::from_value(value)
        .map_err(|err| RpcError::invalid_params(format!("param {index}: {err}")))
}

fn error_body(id: Value, code: i64, message: &str) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message},
    })
    .to_string()
}

fn malformed(reason: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, reason)
}

async fn read_request(stream: &mut TcpStream, timeout: Duration) -> io::Result<HttpRequest> {
    let mut buf = Vec::with_capacity(1024);
    let head_len = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > MAX_HEADER_BYTES {
            return Err(malformed("header too large"));
        }
        if read_some(stream, &mut buf, timeout).await? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before headers",
            ));
        }
    };
    let head = str::from_utf8(&buf[..head_len]).map_err(|_| malformed("header is not utf-8"))?;
    let (method, path, content_len) = parse_head(head)?;
    if content_len > MAX_BODY_BYTES {
        return Err(malformed("body too large"));
    }

    let body_start = head_len + 4;
    while buf.len() < body_start + content_len {
        if read_some(stream, &mut buf, timeout).await? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated body"));
        }
    }
    buf.truncate(body_start + content_len);
    Ok(HttpRequest {
        method,
        path,
        body: buf.split_off(body_start),
    })
}

async fn read_some(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
    timeout: Duration,
) -> io::Result<usize> {
    let mut chunk = [0u8; 4096];
    let n = time::timeout(timeout, stream.read(&mut chunk))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timeout"))??;
    buf.extend_from_slice(&chunk[..n]);
    Ok(n)
}

/// Request line and `Content-Length`; every other header is ignored.
fn parse_head(head: &str) -> io::Result<(String, String, usize)> {
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let (method, path) = match (request_line.next(), request_line.next()) {
        (Some(method), Some(path)) => (method.to_ascii_uppercase(), path.to_string()),
        _ => return Err(malformed("malformed request line")),
    };
    let mut content_len = 0;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                content_len = value
                    .trim()
                    .parse()
                    .map_err(|_| malformed("invalid content-length"))?;
            }
        }
    }
    Ok((method, path, content_len))
}

fn json_response(status: &str, body: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    )
    .into_bytes()
}
