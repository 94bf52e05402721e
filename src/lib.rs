//! Store-and-forward TCP Chat Server Library
//!
//! Clients create or log into accounts, send direct messages, and collect
//! messages that arrived while they were offline.
//!
//! # Features
//! - Length-prefixed binary frame protocol
//! - Account creation, login, logout and deletion
//! - Regex filtered account listing
//! - Direct delivery to online accounts
//! - Per-account FIFO mailboxes for offline accounts
//! - Disconnect and backpressure handling
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the `ChatRouter` and all sessions
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_server::{serve, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(config.addr).await.unwrap();
//!     serve(listener, config).await;
//! }
//! ```

pub mod account;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod message;
pub mod presence;
pub mod router;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use account::{Account, AccountStore};
pub use client::ChatClient;
pub use codec::{decode_frame, encode_frame, Frame, FrameCodec};
pub use config::ServerConfig;
pub use connection::{Connection, ReplyBatch};
pub use error::{AppError, ChatError, FrameError, SendError};
pub use handler::{handle_connection, serve};
pub use message::{Reply, ReplyKind, Request};
pub use presence::PresenceRegistry;
pub use router::{ChatRouter, Delivery};
pub use server::{ChatServer, ServerCommand};
pub use session::Session;
pub use types::{ConnectionId, Opcode};
