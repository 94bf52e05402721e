//! Chat Server - Entry Point
//!
//! Parses configuration, binds the TCP listener and serves connections.

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_server::{serve, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_server=info")),
        )
        .init();

    let config = ServerConfig::parse();

    let listener = TcpListener::bind(config.addr).await?;
    info!("Chat Server listening on {}", listener.local_addr()?);

    serve(listener, config).await;
    Ok(())
}
