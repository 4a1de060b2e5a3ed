//! The demo flow: sign, connect, encrypt, print, decrypt, print.

use crate::auth::{AuthSig, Signer};
use crate::conditions::{demo_conditions, AccessControlConditions, DEMO_PLAINTEXT};
use crate::config::{Config, ConfigError, NetworkTarget};
use crate::net::{
    ConditionNetwork, DecryptRequest, EncryptRequest, GatewayNetwork, LocalNetwork,
    NetworkError, NetworkSession,
};
use crate::wallet::SigningError;
use std::io::{self, Write};
use thiserror::Error;

/// Failures of a round trip, in the order the steps run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error")]
    /// Settings were missing or malformed.
    Config(#[from] ConfigError),
    #[error("signing error")]
    /// The auth sig could not be produced.
    Signing(#[from] SigningError),
    #[error("network error")]
    /// Connect, encrypt or decrypt failed.
    Network(#[from] NetworkError),
    #[error("decrypted data is not valid UTF-8")]
    /// The network returned bytes that are not text.
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("failed to write output")]
    /// Writing the console trace failed.
    Output(#[from] io::Error),
}

/// What a successful round trip produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundTrip {
    /// Ciphertext returned by encrypt.
    pub ciphertext: Vec<u8>,
    /// Hex SHA-256 of the plaintext as reported by the network.
    pub data_to_encrypt_hash: String,
    /// Plaintext returned by decrypt.
    pub decrypted: String,
}

/// Runs the round trip for `plaintext` against `network`, writing the
/// console trace to `out`. The session is released on every path once
/// connected.
pub async fn run_round_trip(
    network: &dyn ConditionNetwork,
    signer: &Signer,
    chain: &str,
    plaintext: &str,
    out: &mut dyn Write,
) -> Result<RoundTrip, RunError> {
    let auth_sig = signer.auth_sig()?;
    tracing::debug!(address = %signer.address(), "auth sig ready");

    let session = network.connect().await?;
    tracing::info!(network = network.name(), "session established");

    let conditions = demo_conditions();
    let outcome = encrypt_then_decrypt(
        session.as_ref(),
        &conditions,
        chain,
        plaintext,
        &auth_sig,
        out,
    )
    .await;
    session.disconnect().await;
    outcome
}

async fn encrypt_then_decrypt(
    session: &dyn NetworkSession,
    conditions: &AccessControlConditions,
    chain: &str,
    plaintext: &str,
    auth_sig: &AuthSig,
    out: &mut dyn Write,
) -> Result<RoundTrip, RunError> {
    let payload = session
        .encrypt(EncryptRequest {
            conditions,
            chain,
            data: plaintext.as_bytes(),
            auth_sig,
        })
        .await?;
    tracing::info!(
        bytes = payload.ciphertext.len(),
        hash = %payload.data_to_encrypt_hash,
        "encrypted"
    );
    writeln!(out, "Encrypted ciphertext (hex):")?;
    writeln!(out, "{}", hex::encode(&payload.ciphertext))?;

    writeln!(out, "Attempting to decrypt...")?;
    let decrypted = session
        .decrypt(DecryptRequest {
            conditions,
            chain,
            payload: &payload,
            auth_sig,
        })
        .await?;
    let decrypted = String::from_utf8(decrypted)?;
    writeln!(out, "Decrypted message:")?;
    writeln!(out, "{decrypted}")?;

    Ok(RoundTrip {
        ciphertext: payload.ciphertext,
        data_to_encrypt_hash: payload.data_to_encrypt_hash,
        decrypted,
    })
}

/// Resolves the network named by `config` and runs the demo round trip,
/// printing to stdout.
pub async fn run(config: &Config) -> Result<RoundTrip, RunError> {
    let signer = Signer::new(config)?;
    let network: Box<dyn ConditionNetwork> = match &config.network {
        NetworkTarget::Local => Box::new(LocalNetwork::default()),
        NetworkTarget::Gateway { url, timeout } => {
            Box::new(GatewayNetwork::new(url.as_str(), *timeout)?)
        }
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_round_trip(
        network.as_ref(),
        &signer,
        &config.chain,
        DEMO_PLAINTEXT,
        &mut out,
    )
    .await
}

/// Renders `err` followed by each of its sources, separated by `: `.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut rendered = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}
