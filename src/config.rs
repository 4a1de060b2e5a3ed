//! Runtime configuration assembled from the process environment and an
//! optional `.env` settings file.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the hex-encoded wallet key.
pub const PRIVATE_KEY_VAR: &str = "PRIVATE_KEY";
/// Default settings file looked up in the working directory.
pub const DEFAULT_ENV_FILE: &str = ".env";

const DEFAULT_DOMAIN: &str = "localhost";
const DEFAULT_ORIGIN: &str = "https://localhost/login";
const DEFAULT_STATEMENT: &str = "This is a test statement.  You can put anything you want here.";
const DEFAULT_SIWE_CHAIN_ID: u64 = 11155111;
const DEFAULT_TTL_SECS: u64 = 60 * 60;
const MAX_TTL_SECS: u64 = 10 * 366 * 24 * 60 * 60;
const DEFAULT_CHAIN: &str = "ethereum";
const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 30_000;

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PRIVATE_KEY is not set")]
    /// No private key was supplied.
    MissingPrivateKey,
    #[error("PRIVATE_KEY is malformed: {0}")]
    /// The private key is not 32 bytes of hex.
    InvalidPrivateKey(String),
    #[error("invalid value for {key}: {reason}")]
    /// Any other variable failed to parse.
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Parser diagnostic.
        reason: String,
    },
    #[error("settings file {path}: {reason}")]
    /// The settings file exists but could not be read or parsed.
    EnvFile {
        /// File that failed.
        path: String,
        /// Failure detail.
        reason: String,
    },
}

/// 32 byte secp256k1 secret. `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey([u8; 32]);

impl PrivateKey {
    /// Parses a hex key with an optional `0x` prefix.
    pub fn from_hex(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        let raw = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if raw.len() != 64 {
            return Err(ConfigError::InvalidPrivateKey(format!(
                "expected 64 hex characters, got {}",
                raw.len()
            )));
        }
        let mut out = [0u8; 32];
        hex::decode_to_slice(raw, &mut out)
            .map_err(|err| ConfigError::InvalidPrivateKey(err.to_string()))?;
        Ok(Self(out))
    }

    /// Borrow the raw secret bytes.
    pub fn expose(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(<redacted>)")
    }
}

/// Fields embedded into every SIWE statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweSettings {
    /// Requesting domain.
    pub domain: String,
    /// URI the signature is scoped to.
    pub origin: String,
    /// Human-readable statement.
    pub statement: String,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Lifetime of a signed statement.
    pub ttl_secs: u64,
}

impl Default for SiweSettings {
    fn default() -> Self {
        Self {
            domain: DEFAULT_DOMAIN.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            statement: DEFAULT_STATEMENT.to_string(),
            chain_id: DEFAULT_SIWE_CHAIN_ID,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

/// Which condition network the runner talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkTarget {
    /// In-process development network.
    Local,
    /// Remote JSON-RPC gateway.
    Gateway {
        /// Endpoint URL.
        url: String,
        /// Per-request timeout.
        timeout: Duration,
    },
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Wallet key used to sign auth statements.
    pub private_key: PrivateKey,
    /// SIWE message fields.
    pub siwe: SiweSettings,
    /// Chain name passed to encrypt and decrypt.
    pub chain: String,
    /// Network selection.
    pub network: NetworkTarget,
}

impl Config {
    /// Loads configuration from the process environment, falling back to
    /// `.env` in the working directory for variables the environment lacks.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = load_env_file(Path::new(DEFAULT_ENV_FILE))?;
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    /// Builds configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let private_key = get(PRIVATE_KEY_VAR)
            .ok_or(ConfigError::MissingPrivateKey)
            .and_then(|v| PrivateKey::from_hex(&v))?;

        let defaults = SiweSettings::default();
        let siwe = SiweSettings {
            domain: get("SIWE_DOMAIN").unwrap_or(defaults.domain),
            origin: get("SIWE_ORIGIN").unwrap_or(defaults.origin),
            statement: get("SIWE_STATEMENT").unwrap_or(defaults.statement),
            chain_id: parse_u64(get("SIWE_CHAIN_ID"), "SIWE_CHAIN_ID")?
                .unwrap_or(defaults.chain_id),
            ttl_secs: parse_u64(get("AUTH_SIG_TTL_SECS"), "AUTH_SIG_TTL_SECS")?
                .unwrap_or(defaults.ttl_secs),
        };
        if siwe.ttl_secs == 0 || siwe.ttl_secs > MAX_TTL_SECS {
            return Err(ConfigError::InvalidValue {
                key: "AUTH_SIG_TTL_SECS",
                reason: format!("must be between 1 and {MAX_TTL_SECS}"),
            });
        }
        for (key, value) in [
            ("SIWE_DOMAIN", &siwe.domain),
            ("SIWE_ORIGIN", &siwe.origin),
            ("SIWE_STATEMENT", &siwe.statement),
        ] {
            single_line(key, value)?;
        }

        let network = match get("LIT_GATEWAY_URL") {
            Some(url) => {
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(ConfigError::InvalidValue {
                        key: "LIT_GATEWAY_URL",
                        reason: "expected an http(s) URL".to_string(),
                    });
                }
                let timeout_ms = parse_u64(get("LIT_GATEWAY_TIMEOUT_MS"), "LIT_GATEWAY_TIMEOUT_MS")?
                    .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_MS);
                NetworkTarget::Gateway {
                    url,
                    timeout: Duration::from_millis(timeout_ms),
                }
            }
            None => NetworkTarget::Local,
        };

        Ok(Self {
            private_key,
            siwe,
            chain: get("LIT_CHAIN").unwrap_or_else(|| DEFAULT_CHAIN.to_string()),
            network,
        })
    }
}

// Each SIWE field renders onto exactly one line of the signed text.
fn single_line(key: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.contains(['\n', '\r']) {
        return Err(ConfigError::InvalidValue {
            key,
            reason: "must not contain line breaks".to_string(),
        });
    }
    Ok(())
}

fn parse_u64(value: Option<String>, key: &'static str) -> Result<Option<u64>, ConfigError> {
    value
        .map(|v| {
            v.trim().parse::<u64>().map_err(|err| ConfigError::InvalidValue {
                key,
                reason: err.to_string(),
            })
        })
        .transpose()
}

/// Reads `KEY=VALUE` pairs from a settings file. A missing file yields an
/// empty map; blank lines and `#` comments are skipped, an optional `export `
/// prefix is accepted and matching single or double quotes are stripped.
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(err) => {
            return Err(ConfigError::EnvFile {
                path: path.display().to_string(),
                reason: err.to_string(),
            })
        }
    };
    parse_env_file(&contents).map_err(|reason| ConfigError::EnvFile {
        path: path.display().to_string(),
        reason,
    })
}

fn parse_env_file(contents: &str) -> Result<HashMap<String, String>, String> {
    let mut out = HashMap::new();
    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {}: expected KEY=VALUE", idx + 1))?;
        let key = key.trim();
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("line {}: invalid key {key:?}", idx + 1));
        }
        out.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    Ok(out)
}

// A quoted value keeps everything between its quotes; anything after the
// closing quote, such as a ` # comment`, is dropped. Unquoted values end at
// the first ` #`.
fn unquote(value: &str) -> &str {
    if let Some(quote @ ('"' | '\'')) = value.chars().next() {
        if let Some(end) = value[1..].find(quote) {
            return &value[1..1 + end];
        }
    }
    value.split(" #").next().unwrap_or(value).trim_end()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn config_with_key(key: &str) -> Config {
        let key = key.to_string();
        Config::from_lookup(move |name| (name == PRIVATE_KEY_VAR).then(|| key.clone())).unwrap()
    }

    #[test]
    fn missing_key_is_config_error() {
        assert!(matches!(
            Config::from_lookup(|_| None),
            Err(ConfigError::MissingPrivateKey)
        ));
        assert!(matches!(
            Config::from_lookup(|k| (k == PRIVATE_KEY_VAR).then(|| "  ".to_string())),
            Err(ConfigError::MissingPrivateKey)
        ));
    }

    #[test]
    fn malformed_key_is_config_error() {
        assert!(matches!(
            Config::from_lookup(|k| (k == PRIVATE_KEY_VAR).then(|| "0x1234".to_string())),
            Err(ConfigError::InvalidPrivateKey(_))
        ));
        let not_hex = "zz".repeat(32);
        assert!(matches!(
            PrivateKey::from_hex(&not_hex),
            Err(ConfigError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn defaults_apply() {
        let cfg = config_with_key(&"11".repeat(32));
        assert_eq!(cfg.siwe, SiweSettings::default());
        assert_eq!(cfg.chain, "ethereum");
        assert_eq!(cfg.network, NetworkTarget::Local);
        assert_eq!(format!("{:?}", cfg.private_key), "PrivateKey(<redacted>)");
    }

    #[test]
    fn gateway_target_is_parsed() {
        let vars: HashMap<&str, String> = [
            (PRIVATE_KEY_VAR, "22".repeat(32)),
            ("LIT_GATEWAY_URL", "http://127.0.0.1:7470".to_string()),
            ("LIT_GATEWAY_TIMEOUT_MS", "1500".to_string()),
            ("SIWE_CHAIN_ID", "1".to_string()),
        ]
        .into_iter()
        .collect();
        let cfg = Config::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(
            cfg.network,
            NetworkTarget::Gateway {
                url: "http://127.0.0.1:7470".to_string(),
                timeout: Duration::from_millis(1500),
            }
        );
        assert_eq!(cfg.siwe.chain_id, 1);
    }

    #[test]
    fn bad_numeric_value_is_reported() {
        let key = "33".repeat(32);
        let err = Config::from_lookup(|k| match k {
            PRIVATE_KEY_VAR => Some(key.clone()),
            "AUTH_SIG_TTL_SECS" => Some("soon".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "AUTH_SIG_TTL_SECS",
                ..
            }
        ));
    }

    #[test]
    fn oversized_ttl_is_rejected() {
        let key = "55".repeat(32);
        for ttl in ["10000000000000", "18446744073709551615"] {
            let err = Config::from_lookup(|k| match k {
                PRIVATE_KEY_VAR => Some(key.clone()),
                "AUTH_SIG_TTL_SECS" => Some(ttl.to_string()),
                _ => None,
            })
            .unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue {
                    key: "AUTH_SIG_TTL_SECS",
                    ..
                }
            ));
        }
    }

    #[test]
    fn multiline_siwe_fields_are_rejected() {
        let key = "66".repeat(32);
        for var in ["SIWE_STATEMENT", "SIWE_DOMAIN", "SIWE_ORIGIN"] {
            let err = Config::from_lookup(|k| match k {
                PRIVATE_KEY_VAR => Some(key.clone()),
                k if k == var => Some("line one\nline two".to_string()),
                _ => None,
            })
            .unwrap_err();
            match err {
                ConfigError::InvalidValue { key, .. } => assert_eq!(key, var),
                other => panic!("unexpected error {other:?}"),
            }
        }
    }

    #[test]
    fn env_file_parsing() {
        let parsed = parse_env_file(
            "# comment\n\nPRIVATE_KEY=\"0xabc\"\nexport LIT_CHAIN=ethereum # trailing\nSIWE_DOMAIN='example.org'\n",
        )
        .unwrap();
        assert_eq!(parsed["PRIVATE_KEY"], "0xabc");
        assert_eq!(parsed["LIT_CHAIN"], "ethereum");
        assert_eq!(parsed["SIWE_DOMAIN"], "example.org");
        assert!(parse_env_file("NOT A PAIR").is_err());

        let key = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
        let parsed = parse_env_file(&format!(
            "PRIVATE_KEY=\"0x{key}\" # wallet\nSIWE_STATEMENT='keep # this' # note\n"
        ))
        .unwrap();
        assert_eq!(parsed["PRIVATE_KEY"], format!("0x{key}"));
        assert_eq!(parsed["SIWE_STATEMENT"], "keep # this");
        assert!(PrivateKey::from_hex(&parsed["PRIVATE_KEY"]).is_ok());
    }

    #[test]
    fn missing_env_file_is_empty() {
        let mut path = std::env::temp_dir();
        path.push("litseal_definitely_missing.env");
        assert!(load_env_file(&path).unwrap().is_empty());
    }

    #[test]
    fn env_file_round_trip_through_disk() {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "litseal_env_{}.env",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        fs::write(&path, "PRIVATE_KEY=44\n").unwrap();
        let parsed = load_env_file(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert_eq!(parsed.get("PRIVATE_KEY").map(String::as_str), Some("44"));
    }
}
