//! EIP-4361 (Sign-In With Ethereum) message construction and parsing.
//!
//! The rendered text is the exact byte string that gets signed, so rendering
//! and parsing must agree line for line:
//!
//! ```text
//! {domain} wants you to sign in with your Ethereum account:
//! {address}
//!
//! {statement}
//!
//! URI: {uri}
//! Version: {version}
//! Chain ID: {chain_id}
//! Nonce: {nonce}
//! Issued At: {issued_at}
//! Expiration Time: {expiration_time}
//! ```

use crate::wallet::Address;
use chrono::{DateTime, SecondsFormat, Utc};
use rand::{distributions::Alphanumeric, Rng};
use std::fmt;
use thiserror::Error;

const HEADER_SUFFIX: &str = " wants you to sign in with your Ethereum account:";
const MIN_NONCE_LEN: usize = 8;
const DEFAULT_NONCE_LEN: usize = 16;

/// Errors raised while parsing or validating a SIWE message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SiweError {
    #[error("missing header line")]
    /// First line is not a SIWE header.
    MissingHeader,
    #[error("invalid address line: {0}")]
    /// Second line is not a valid address.
    InvalidAddress(String),
    #[error("missing field: {0}")]
    /// A mandatory field was absent.
    MissingField(&'static str),
    #[error("invalid field {field}: {reason}")]
    /// A field failed to parse.
    InvalidField {
        /// Field label.
        field: &'static str,
        /// Parser diagnostic.
        reason: String,
    },
    #[error("unexpected line: {0}")]
    /// Trailing or unknown content.
    UnexpectedLine(String),
}

/// Structured EIP-4361 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiweMessage {
    /// RFC 3986 authority requesting the signature.
    pub domain: String,
    /// Signing account.
    pub address: Address,
    /// Human-readable assertion.
    pub statement: Option<String>,
    /// Subject of the signing request.
    pub uri: String,
    /// Message format version, always `1` today.
    pub version: String,
    /// EIP-155 chain id the session is bound to.
    pub chain_id: u64,
    /// Replay-protection token, at least eight alphanumeric characters.
    pub nonce: String,
    /// Time the message was generated.
    pub issued_at: DateTime<Utc>,
    /// Time after which the signed message is no longer valid.
    pub expiration_time: Option<DateTime<Utc>>,
    /// Time before which the signed message is not yet valid.
    pub not_before: Option<DateTime<Utc>>,
    /// Optional system-specific request identifier.
    pub request_id: Option<String>,
    /// Resources the user wishes to have resolved as part of authentication.
    pub resources: Vec<String>,
}

impl SiweMessage {
    /// Renders the message in its canonical signable form.
    pub fn prepare_message(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.domain);
        out.push_str(HEADER_SUFFIX);
        out.push('\n');
        out.push_str(&self.address.to_checksum());
        out.push_str("\n\n");
        if let Some(statement) = &self.statement {
            out.push_str(statement);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&format!("URI: {}\n", self.uri));
        out.push_str(&format!("Version: {}\n", self.version));
        out.push_str(&format!("Chain ID: {}\n", self.chain_id));
        out.push_str(&format!("Nonce: {}\n", self.nonce));
        out.push_str(&format!("Issued At: {}", format_timestamp(&self.issued_at)));
        if let Some(exp) = &self.expiration_time {
            out.push_str(&format!("\nExpiration Time: {}", format_timestamp(exp)));
        }
        if let Some(nbf) = &self.not_before {
            out.push_str(&format!("\nNot Before: {}", format_timestamp(nbf)));
        }
        if let Some(request_id) = &self.request_id {
            out.push_str(&format!("\nRequest ID: {request_id}"));
        }
        if !self.resources.is_empty() {
            out.push_str("\nResources:");
            for resource in &self.resources {
                out.push_str(&format!("\n- {resource}"));
            }
        }
        out
    }

    /// Parses a rendered message back into its fields.
    pub fn parse(text: &str) -> Result<Self, SiweError> {
        let mut lines = text.split('\n').peekable();

        let header = lines.next().ok_or(SiweError::MissingHeader)?;
        let domain = header
            .strip_suffix(HEADER_SUFFIX)
            .filter(|d| !d.is_empty())
            .ok_or(SiweError::MissingHeader)?
            .to_string();

        let address_line = lines
            .next()
            .ok_or(SiweError::MissingField("address"))?;
        let address = Address::parse(address_line)
            .ok_or_else(|| SiweError::InvalidAddress(address_line.to_string()))?;

        if lines.next() != Some("") {
            return Err(SiweError::MissingField("blank line after address"));
        }
        let statement = match lines.next() {
            Some("") => None,
            Some(line) => {
                if lines.next() != Some("") {
                    return Err(SiweError::MissingField("blank line after statement"));
                }
                Some(line.to_string())
            }
            None => return Err(SiweError::MissingField("URI")),
        };

        let uri = take_field(&mut lines, "URI")?;
        let version = take_field(&mut lines, "Version")?;
        if version != "1" {
            return Err(SiweError::InvalidField {
                field: "Version",
                reason: format!("unsupported version {version}"),
            });
        }
        let chain_id = take_field(&mut lines, "Chain ID")?
            .parse::<u64>()
            .map_err(|err| SiweError::InvalidField {
                field: "Chain ID",
                reason: err.to_string(),
            })?;
        let nonce = take_field(&mut lines, "Nonce")?;
        if nonce.len() < MIN_NONCE_LEN || !nonce.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SiweError::InvalidField {
                field: "Nonce",
                reason: "expected at least 8 alphanumeric characters".to_string(),
            });
        }
        let issued_at = parse_timestamp("Issued At", &take_field(&mut lines, "Issued At")?)?;

        let expiration_time = take_optional(&mut lines, "Expiration Time")
            .map(|v| parse_timestamp("Expiration Time", &v))
            .transpose()?;
        let not_before = take_optional(&mut lines, "Not Before")
            .map(|v| parse_timestamp("Not Before", &v))
            .transpose()?;
        let request_id = take_optional(&mut lines, "Request ID");

        let mut resources = Vec::new();
        if lines.peek() == Some(&"Resources:") {
            lines.next();
            while let Some(line) = lines.peek() {
                match line.strip_prefix("- ") {
                    Some(resource) => {
                        resources.push(resource.to_string());
                        lines.next();
                    }
                    None => break,
                }
            }
        }

        if let Some(extra) = lines.find(|line| !line.is_empty()) {
            return Err(SiweError::UnexpectedLine(extra.to_string()));
        }

        Ok(Self {
            domain,
            address,
            statement,
            uri,
            version,
            chain_id,
            nonce,
            issued_at,
            expiration_time,
            not_before,
            request_id,
            resources,
        })
    }

    /// Returns `true` when `now` lies within the message's validity window.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(exp) = self.expiration_time {
            if now >= exp {
                return false;
            }
        }
        if let Some(nbf) = self.not_before {
            if now < nbf {
                return false;
            }
        }
        true
    }
}

impl fmt::Display for SiweMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prepare_message())
    }
}

/// Generates a random alphanumeric nonce.
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DEFAULT_NONCE_LEN)
        .map(char::from)
        .collect()
}

/// ISO-8601 rendering with millisecond precision and a `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, SiweError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| SiweError::InvalidField {
            field,
            reason: err.to_string(),
        })
}

fn take_field<'a>(
    lines: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>,
    label: &'static str,
) -> Result<String, SiweError> {
    take_optional(lines, label).ok_or(SiweError::MissingField(label))
}

fn take_optional<'a>(
    lines: &mut std::iter::Peekable<impl Iterator<Item = &'a str>>,
    label: &'static str,
) -> Option<String> {
    let value = lines
        .peek()?
        .strip_prefix(label)?
        .strip_prefix(": ")?
        .to_string();
    lines.next();
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample() -> SiweMessage {
        let issued = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        SiweMessage {
            domain: "localhost".to_string(),
            address: Address::parse("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266").unwrap(),
            statement: Some("This is a test statement.".to_string()),
            uri: "https://localhost/login".to_string(),
            version: "1".to_string(),
            chain_id: 11155111,
            nonce: "abcdef0123456789".to_string(),
            issued_at: issued,
            expiration_time: Some(issued + Duration::hours(1)),
            not_before: None,
            request_id: None,
            resources: Vec::new(),
        }
    }

    #[test]
    fn renders_canonical_layout() {
        let expected = "localhost wants you to sign in with your Ethereum account:\n\
0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266\n\
\n\
This is a test statement.\n\
\n\
URI: https://localhost/login\n\
Version: 1\n\
Chain ID: 11155111\n\
Nonce: abcdef0123456789\n\
Issued At: 2026-10-17T12:00:00.000Z\n\
Expiration Time: 2026-10-17T13:00:00.000Z";
        assert_eq!(sample().prepare_message(), expected);
    }

    #[test]
    fn parse_recovers_all_fields() {
        let mut msg = sample();
        msg.request_id = Some("req-7".to_string());
        msg.resources = vec!["ipfs://Qm1".to_string(), "https://example.com/a".to_string()];
        let parsed = SiweMessage::parse(&msg.prepare_message()).unwrap();
        assert_eq!(parsed, msg);
    }

    #[test]
    fn parse_without_statement() {
        let mut msg = sample();
        msg.statement = None;
        let text = msg.prepare_message();
        assert!(text.contains("92266\n\n\nURI:"));
        assert_eq!(SiweMessage::parse(&text).unwrap().statement, None);
    }

    #[test]
    fn parse_rejects_short_nonce() {
        let mut msg = sample();
        msg.nonce = "abc".to_string();
        assert!(matches!(
            SiweMessage::parse(&msg.prepare_message()),
            Err(SiweError::InvalidField { field: "Nonce", .. })
        ));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(
            SiweMessage::parse("hello world"),
            Err(SiweError::MissingHeader)
        );
    }

    #[test]
    fn validity_window() {
        let msg = sample();
        assert!(msg.is_valid_at(msg.issued_at));
        assert!(!msg.is_valid_at(msg.issued_at + Duration::hours(2)));
    }

    #[test]
    fn nonce_is_alphanumeric() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), DEFAULT_NONCE_LEN);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
