//! Error types for the chat server
//!
//! `AppError` covers transport-level failures that end a connection or
//! the process. `RouterError` is the recoverable per-frame taxonomy:
//! every variant maps to a direct `error` reply to the offending
//! connection and never terminates anything.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Wire error codes carried in `error` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ClientNotFound,
    InvalidFormat,
    InvalidStructure,
    RateLimited,
    InvalidUsername,
    UsernameTaken,
    UserNotJoined,
    EmptyMessage,
    UnknownType,
    InternalError,
}

/// Recoverable failure while routing one inbound frame
///
/// Each variant answers the sender with an `error` frame; none of them
/// drop the connection or affect any other peer.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The referenced connection is no longer registered
    #[error("Client not found")]
    UnknownConnection,

    /// Payload is not parseable JSON
    #[error("Invalid message format")]
    MalformedFrame,

    /// Parsed JSON lacks the required `type`/`data` shape
    #[error("{0}")]
    InvalidStructure(String),

    /// Per-connection message quota exhausted
    #[error("Rate limit exceeded. Please slow down.")]
    RateLimited {
        /// Quota hint reported back to the client
        remaining: u32,
    },

    /// Display name failed validation; carries the reason
    #[error("{0}")]
    InvalidUsername(String),

    /// Another registered identity already uses this name
    #[error("Username is already taken")]
    UsernameTaken,

    /// Operation requires a completed join
    #[error("User not joined")]
    UserNotJoined,

    /// Chat content empty after trimming
    #[error("Message cannot be empty")]
    EmptyMessage,

    /// Frame `type` outside the protocol
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// Unexpected failure during dispatch, downgraded at the router boundary
    #[error("Internal server error")]
    Internal,
}

impl RouterError {
    /// The wire code for this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            RouterError::UnknownConnection => ErrorCode::ClientNotFound,
            RouterError::MalformedFrame => ErrorCode::InvalidFormat,
            RouterError::InvalidStructure(_) => ErrorCode::InvalidStructure,
            RouterError::RateLimited { .. } => ErrorCode::RateLimited,
            RouterError::InvalidUsername(_) => ErrorCode::InvalidUsername,
            RouterError::UsernameTaken => ErrorCode::UsernameTaken,
            RouterError::UserNotJoined => ErrorCode::UserNotJoined,
            RouterError::EmptyMessage => ErrorCode::EmptyMessage,
            RouterError::UnknownType(_) => ErrorCode::UnknownType,
            RouterError::Internal => ErrorCode::InternalError,
        }
    }

    /// Remaining-quota hint, present only for rate-limit rejections
    pub fn remaining(&self) -> Option<u32> {
        match self {
            RouterError::RateLimited { remaining } => Some(*remaining),
            _ => None,
        }
    }
}

/// Application-level errors
///
/// Covers fatal per-connection failures (transport, IO) and broken
/// internal channels. Protocol-level failures are `RouterError`.
#[derive(Debug, Error)]
pub enum AppError {
    /// WebSocket protocol error (fatal for the connection)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,
}

/// Message send errors
///
/// Occurs when attempting to deliver an outbound frame to a
/// connection's write task.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The outbound buffer for this connection is full
    #[error("Channel full")]
    ChannelFull,
}
