//! Connection struct definition
//!
//! Represents one live transport session with its outbound channel,
//! optional joined identity, and liveness bookkeeping.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::types::{ClientId, User};

/// One live client connection
///
/// Created at transport-open, destroyed at transport-close/error. While
/// registered it is exclusively owned by the session registry; other
/// components borrow it by id lookup.
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ClientId,
    /// Outbound channel to this connection's write task (serialized frames)
    sender: mpsc::Sender<String>,
    /// Joined identity (None while anonymous)
    pub user: Option<User>,
    /// Last server-ping send or inbound client-ping time
    pub last_ping_at: Instant,
    /// Liveness flag, cleared by the eviction sweep and restored by ping
    pub alive: bool,
}

impl Connection {
    /// Create a new connection with the given ID and outbound sender
    pub fn new(id: ClientId, sender: mpsc::Sender<String>) -> Self {
        Self {
            id,
            sender,
            user: None,
            last_ping_at: Instant::now(),
            alive: true,
        }
    }

    /// Queue a serialized frame to this connection, fire-and-forget
    ///
    /// Non-blocking so one slow peer cannot stall fan-out to the others.
    /// A full or closed outbound buffer is reported, not fatal; removal
    /// happens only through the explicit close/error path.
    pub fn send(&self, text: String) -> Result<(), SendError> {
        self.sender.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Whether this connection has completed the join step
    pub fn is_joined(&self) -> bool {
        self.user.is_some()
    }

    /// Stamp liveness from an inbound ping
    pub fn mark_alive(&mut self) {
        self.last_ping_at = Instant::now();
        self.alive = true;
    }
}
