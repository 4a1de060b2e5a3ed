#![deny(missing_docs)]

//! # litseal
//!
//! **litseal** signs a Sign-In With Ethereum statement with a wallet key and
//! uses it to round-trip a secret through an access-control-condition
//! encryption network: the plaintext is sealed under a condition list, and the
//! network only releases it again once the conditions hold for the wallet that
//! presents the signature.
//!
//! ## Layers
//!
//! * [`wallet`]: secp256k1 keys, EIP-55 addresses and EIP-191 personal
//!   signatures with signer recovery.
//! * [`siwe`]: EIP-4361 message rendering and parsing.
//! * [`auth`]: the [`AuthSig`] document built from the two above, and its
//!   verification.
//! * [`conditions`]: condition lists, canonical hashing and evaluation.
//! * [`config`]: environment and `.env` driven settings.
//! * `net` (feature `net`): the [`ConditionNetwork`](net::ConditionNetwork)
//!   collaborator, an in-process development network, a JSON-RPC gateway
//!   client and the devnode server.
//! * `runner` (feature `net`): the connect, encrypt, decrypt flow used by the
//!   `litseal` binary.
//!
//! ## Usage
//!
//! ```rust
//! use litseal::{AccessControlConditions, Config};
//!
//! let config = Config::from_lookup(|key| match key {
//!     "PRIVATE_KEY" => Some(
//!         "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80".to_string(),
//!     ),
//!     _ => None,
//! })
//! .unwrap();
//! let signer = litseal::Signer::new(&config).unwrap();
//! let auth_sig = signer.auth_sig().unwrap();
//! let message = litseal::verify_auth_sig(&auth_sig).unwrap();
//! assert_eq!(message.address, signer.address());
//!
//! let conditions: AccessControlConditions = litseal::demo_conditions();
//! assert_eq!(conditions.hash_hex().unwrap().len(), 64);
//! ```

pub mod auth;
pub mod conditions;
pub mod config;
pub mod siwe;
pub mod wallet;

#[cfg(feature = "net")]
pub mod net;
#[cfg(feature = "net")]
pub mod runner;

pub use auth::{verify_auth_sig, AuthError, AuthSig, Signer};
pub use conditions::{
    demo_conditions, wallet_owner_condition, AccessCondition, AccessControlConditions,
    ConditionError, DEMO_PLAINTEXT,
};
pub use config::{Config, ConfigError, NetworkTarget};
pub use siwe::{SiweError, SiweMessage};
pub use wallet::{recover_signer, Address, SigningError, Wallet};

#[cfg(feature = "net")]
pub use runner::{run_round_trip, RoundTrip, RunError};
