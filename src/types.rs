//! Core domain types for the chat server
//!
//! Defines the connection identifier, user identity, and the chat/system
//! events stored in the shared history ring, plus the small helpers the
//! protocol needs (event ids, wire timestamps, color assignment, username
//! validation).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique client/connection identifier (newtype pattern)
///
/// Wraps a UUID v4. Assigned once at transport-open and never reused
/// while the connection is registered. Implements Hash and Eq for use
/// as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(pub Uuid);

impl ClientId {
    /// Create a new random client ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Generate a fresh id for a wire frame or chat event
pub fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time as an RFC 3339 UTC string, the wire timestamp format
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Display accent colors assigned to users at join time
const USER_COLORS: &[&str] = &[
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7",
    "#DDA0DD", "#98D8C8", "#F7DC6F", "#BB8FCE", "#85C1E9",
    "#F8C471", "#82E0AA", "#F1948A", "#D98880", "#D7BDE2",
];

/// Pick a random display color for a new user
pub fn random_color() -> String {
    use rand::seq::SliceRandom;
    USER_COLORS
        .choose(&mut rand::thread_rng())
        .expect("palette is non-empty")
        .to_string()
}

/// Maximum stored length of a chat message, in characters
pub const MAX_MESSAGE_CHARS: usize = 500;

/// Trim and truncate chat content to the stored limit
pub fn sanitize_content(content: &str) -> String {
    content.trim().chars().take(MAX_MESSAGE_CHARS).collect()
}

/// Validate a prospective display name
///
/// Rules: 2..=20 characters, letters/digits/underscores/spaces only,
/// and not the reserved word "system" (case-insensitive). Returns the
/// human-readable reason on rejection.
pub fn validate_username(username: &str) -> Result<(), String> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err("Username is required".to_string());
    }
    if username.chars().count() < 2 {
        return Err("Username must be at least 2 characters long".to_string());
    }
    if username.chars().count() > 20 {
        return Err("Username must be less than 20 characters long".to_string());
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ' ')
    {
        return Err(
            "Username can only contain letters, numbers, underscores, and spaces".to_string(),
        );
    }
    if trimmed.eq_ignore_ascii_case("system") {
        return Err("Username \"system\" is reserved".to_string());
    }
    Ok(())
}

/// Identity bound to exactly one connection after a successful join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Equal to the owning connection's id
    pub id: ClientId,
    /// Display name, unique among registered identities (case-insensitive)
    pub name: String,
    /// Display accent color, assigned randomly at join
    pub color: String,
    /// RFC 3339 join time
    pub joined_at: String,
    pub is_active: bool,
}

impl User {
    /// Build a new identity for the given connection
    pub fn new(id: ClientId, name: String) -> Self {
        Self {
            id,
            name,
            color: random_color(),
            joined_at: now_rfc3339(),
            is_active: true,
        }
    }
}

/// A chat message authored by a joined user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub user_id: ClientId,
    pub username: String,
    pub user_color: String,
    pub content: String,
    pub timestamp: String,
}

impl ChatMessage {
    /// Build a chat message from its author and sanitized content
    pub fn new(user: &User, content: String) -> Self {
        Self {
            id: new_event_id(),
            user_id: user.id,
            username: user.name.clone(),
            user_color: user.color.clone(),
            content,
            timestamp: now_rfc3339(),
        }
    }
}

/// Category of a server-generated system message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemKind {
    UserJoined,
    UserLeft,
    System,
}

/// A server-generated announcement (joins, leaves, renames)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemMessage {
    pub id: String,
    pub content: String,
    pub timestamp: String,
    pub kind: SystemKind,
}

impl SystemMessage {
    pub fn new(content: String, kind: SystemKind) -> Self {
        Self {
            id: new_event_id(),
            content,
            timestamp: now_rfc3339(),
            kind,
        }
    }
}

/// One entry of the shared message history
///
/// Untagged on the wire: chat entries carry `userId`, system entries
/// carry `kind`, which is how clients tell them apart inside
/// `chat_history.messages`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ChatEvent {
    Chat(ChatMessage),
    System(SystemMessage),
}
