//! Relay server for trying the Beacon client.
//!
//! Accepts WebSocket connections carrying a `?token=` parameter and fans every
//! valid envelope out to all connected clients, sender included.
//!
//! Run:
//!   cargo run -p beacon-demo-relay -- --port 8080 --token dev-token
//!
//! With no `--token`, any non-empty token is accepted.

mod server;

use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "beacon-relay", about = "Broadcast relay for Beacon envelopes")]
struct Args {
    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Accepted connect tokens (repeat or comma-separate).
    #[arg(long = "token", env = "BEACON_RELAY_TOKENS", value_delimiter = ',')]
    tokens: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("beacon_relay=info".parse()?))
        .init();

    let args = Args::parse();
    let addr: SocketAddr = ([127, 0, 0, 1], args.port).into();

    if args.tokens.is_empty() {
        tracing::info!("No tokens configured; accepting any non-empty token");
    }
    tracing::info!("Starting relay on {}", addr);

    server::run(addr, server::TokenPolicy::new(args.tokens)).await
}
