//! Multi-client WebSocket broadcast chat server library
//!
//! A real-time chat server built with tokio-tungstenite using the Actor
//! pattern for state management: clients join a shared room under a
//! display name, exchange messages, and receive presence updates and
//! liveness checks.
//!
//! # Features
//! - WebSocket connection handling with a welcome frame at connect
//! - Join with validated, unique display names
//! - Room-wide chat broadcast with bounded message history
//! - Presence updates (user list and count) on membership changes
//! - Typing indicators
//! - Per-connection rate limiting
//! - Heartbeat scheduler with optional eviction of unresponsive peers
//! - HTTP diagnostics endpoints (/health, /info, /stats)
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the session registry,
//!   history ring, and rate limiter
//! - Each connection has a `handler` task communicating with the server
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio::sync::mpsc;
//! use chatroom::{ChatServer, Config, handle_connection};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env();
//!     let listener = TcpListener::bind(&config.ws_addr).await.unwrap();
//!     let (cmd_tx, cmd_rx) = mpsc::channel(256);
//!
//!     tokio::spawn(ChatServer::new(cmd_rx, &config).run());
//!
//!     while let Ok((stream, _)) = listener.accept().await {
//!         let cmd_tx = cmd_tx.clone();
//!         tokio::spawn(handle_connection(stream, cmd_tx));
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod heartbeat;
pub mod history;
pub mod http;
pub mod message;
pub mod rate_limit;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::Connection;
pub use config::Config;
pub use error::{AppError, ErrorCode, RouterError, SendError};
pub use handler::handle_connection;
pub use history::HistoryRing;
pub use message::{ClientFrame, OutboundFrame, ServerFrame};
pub use rate_limit::RateLimiter;
pub use registry::SessionRegistry;
pub use server::{ChatServer, ServerCommand, ServerStats};
pub use types::{ChatEvent, ChatMessage, ClientId, SystemKind, SystemMessage, User};
