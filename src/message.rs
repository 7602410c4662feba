//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enums
//! for type-safe serialization/deserialization. Every frame on the wire
//! is an object with a `type` string and a `data` object; outbound
//! frames additionally carry a `timestamp` and an `id` at the top level.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, RouterError};
use crate::types::{now_rfc3339, new_event_id, ChatEvent, ChatMessage, ClientId, SystemMessage, User};

/// Frame types the server understands
pub const KNOWN_CLIENT_TYPES: &[&str] = &["join", "chat", "ping", "typing"];

/// Client → Server frame
///
/// Closed union of the inbound protocol. Missing `username`/`content`
/// fields default to empty strings and fail the relevant validation in
/// the router rather than at decode time.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Bind a display name to this connection
    Join(JoinData),
    /// Send a chat message to the room
    Chat(ChatData),
    /// Application-level liveness probe
    Ping(ClientPingData),
    /// Typing indicator toggle
    Typing(ClientTypingData),
}

#[derive(Debug, Deserialize)]
pub struct JoinData {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatData {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ClientPingData {
    /// Client-side send time, echoed nowhere; liveness only
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClientTypingData {
    #[serde(default, rename = "isTyping")]
    pub is_typing: bool,
}

/// Server → Client frame payload
///
/// Adjacently tagged to produce the `{type, data}` wire shape; wrapped
/// in [`OutboundFrame`] for the envelope fields.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once at connect
    Welcome(WelcomeData),
    /// Direct reply to a successful join
    ChatHistory(ChatHistoryData),
    /// Broadcast on any membership change
    UserList(UserListData),
    /// Broadcast alongside `user_list`
    UserCount(UserCountData),
    /// Broadcast per accepted chat message
    Chat(ChatMessage),
    /// Broadcast join/leave/rename announcement
    System(SystemMessage),
    /// Broadcast per typing event, sender excluded
    Typing(TypingData),
    /// Direct reply to a client ping
    Pong(PongData),
    /// Server-initiated heartbeat probe
    Ping(PingData),
    /// Direct reply on any routing failure
    Error(ErrorData),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomeData {
    pub client_id: ClientId,
    pub message: String,
    pub timestamp: String,
    /// Example frames showing the inbound protocol
    pub instructions: serde_json::Value,
}

impl WelcomeData {
    /// Build the standard connect greeting for a fresh connection
    pub fn new(client_id: ClientId) -> Self {
        let now = now_rfc3339();
        Self {
            client_id,
            message: "Connected to WebSocket server".to_string(),
            timestamp: now.clone(),
            instructions: serde_json::json!({
                "join": { "type": "join", "data": { "username": "YourUsername" } },
                "chat": { "type": "chat", "data": { "content": "Your message" } },
                "ping": { "type": "ping", "data": { "timestamp": now } },
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatHistoryData {
    pub messages: Vec<ChatEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserListData {
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserCountData {
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingData {
    pub user_id: ClientId,
    pub username: String,
    pub user_color: String,
    pub is_typing: bool,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PongData {
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PingData {
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorData {
    pub message: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

/// Convert a routing failure into the `error` reply payload
impl From<&RouterError> for ServerFrame {
    fn from(err: &RouterError) -> Self {
        ServerFrame::Error(ErrorData {
            message: err.to_string(),
            code: err.code(),
            remaining: err.remaining(),
        })
    }
}

/// Complete outbound frame: `{type, data, timestamp, id}`
#[derive(Debug, Clone, Serialize)]
pub struct OutboundFrame {
    #[serde(flatten)]
    pub payload: ServerFrame,
    pub timestamp: String,
    pub id: String,
}

impl OutboundFrame {
    /// Envelope a payload with a fresh id and the current timestamp
    pub fn new(payload: ServerFrame) -> Self {
        Self {
            payload,
            timestamp: now_rfc3339(),
            id: new_event_id(),
        }
    }

    /// Serialize to the wire text
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
