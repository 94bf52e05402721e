//! Server configuration
//!
//! Parsed from the command line with clap; every field has a default so the
//! server runs with no arguments.

use std::net::SocketAddr;

use clap::Parser;

use crate::codec::DEFAULT_MAX_PAYLOAD;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:6666";

/// Channel buffer size for server commands
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Per-connection reply buffer
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Socket address to listen on. Use port 0 for an ephemeral port.
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub addr: SocketAddr,

    /// Capacity of the command channel into the server actor.
    #[arg(long, default_value_t = DEFAULT_COMMAND_BUFFER)]
    pub command_buffer: usize,

    /// Replies buffered per connection before it is dropped as stalled.
    #[arg(long, default_value_t = DEFAULT_OUTBOUND_BUFFER)]
    pub outbound_buffer: usize,

    /// Largest accepted request payload, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    pub max_payload: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::parse_from(["chat_server"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.addr, DEFAULT_ADDR.parse::<SocketAddr>().unwrap());
        assert_eq!(config.command_buffer, DEFAULT_COMMAND_BUFFER);
        assert_eq!(config.outbound_buffer, DEFAULT_OUTBOUND_BUFFER);
        assert_eq!(config.max_payload, DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::parse_from([
            "chat_server",
            "--addr",
            "0.0.0.0:7000",
            "--outbound-buffer",
            "8",
            "--max-payload",
            "1024",
        ]);
        assert_eq!(config.addr.port(), 7000);
        assert_eq!(config.outbound_buffer, 8);
        assert_eq!(config.max_payload, 1024);
        assert_eq!(config.command_buffer, DEFAULT_COMMAND_BUFFER);
    }

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        ServerConfig::command().debug_assert();
    }
}
