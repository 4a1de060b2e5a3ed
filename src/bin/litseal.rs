//! Signs a SIWE auth statement, encrypts the demo secret under an IPFS Lit
//! Action condition, and decrypts it again.
//!
//! Set `PRIVATE_KEY` (environment or `.env`). With `LIT_GATEWAY_URL` unset the
//! in-process development network is used.

use litseal::config::Config;
use litseal::runner::{self, error_chain, RunError};
use tracing_subscriber::EnvFilter;

fn fatal(err: &RunError) -> ! {
    eprintln!("Error: {}", error_chain(err));
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("litseal=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => fatal(&RunError::from(err)),
    };
    if let Err(err) = runner::run(&config).await {
        fatal(&err);
    }
}
