//! Serves the in-process development network over JSON-RPC so the `litseal`
//! binary can reach it through `LIT_GATEWAY_URL`.

use litseal::net::{run_devnode, ActionRegistry, DevnodeConfig, LocalNetwork};
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

const LISTEN_VAR: &str = "LITSEAL_DEVNODE_LISTEN";
const DEFAULT_LISTEN: &str = "127.0.0.1:7470";

fn fatal(message: &str) -> ! {
    eprintln!("Error: {message}");
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

    let listen = std::env::var(LISTEN_VAR).unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
    let listen: SocketAddr = match listen.parse() {
        Ok(addr) => addr,
        Err(err) => fatal(&format!("{LISTEN_VAR} is malformed: {err}")),
    };

    let network = LocalNetwork::new(ActionRegistry::with_defaults());
    if let Err(err) = run_devnode(DevnodeConfig::new(listen), network).await {
        fatal(&format!("devnode stopped: {err}"));
    }
}
