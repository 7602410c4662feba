//! ChatServer Actor implementation
//!
//! The central actor that owns all shared state: the session registry,
//! the message history ring, and the rate limiter. Uses the Actor
//! pattern with mpsc channels for message passing, so registry
//! mutation, history appends, and quota updates all happen on a single
//! logical thread of control - concurrent connects, sends, and
//! disconnects can never observe torn state, and two simultaneous joins
//! with the same name cannot both succeed.
//!
//! The actor also implements the protocol state machine: each
//! connection is Anonymous until a successful `join` makes it Joined,
//! and only disconnect leaves that state.

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::Connection;
use crate::config::Config;
use crate::error::RouterError;
use crate::history::HistoryRing;
use crate::message::{
    ChatHistoryData, ClientFrame, OutboundFrame, PingData, PongData, ServerFrame, TypingData,
    UserCountData, UserListData, KNOWN_CLIENT_TYPES,
};
use crate::rate_limit::RateLimiter;
use crate::registry::SessionRegistry;
use crate::types::{
    now_rfc3339, sanitize_content, validate_username, ChatEvent, ChatMessage, ClientId,
    SystemKind, SystemMessage, User,
};

/// Number of history entries returned in a `chat_history` reply
const HISTORY_REPLY_LIMIT: usize = 50;

/// Commands sent from connection handlers and periodic tasks to the actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New client connected
    Connect {
        client_id: ClientId,
        sender: mpsc::Sender<String>,
    },
    /// Raw inbound frame from a client
    Inbound { client_id: ClientId, raw: String },
    /// Client disconnected (transport close or error)
    Disconnect { client_id: ClientId },
    /// Periodic liveness sweep
    Heartbeat,
    /// Read-only stats snapshot for the diagnostics surface
    GetStats { reply: oneshot::Sender<ServerStats> },
}

/// Aggregate counters exposed via `/health` and `/stats`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: usize,
    pub active_users: usize,
    pub total_messages: u64,
    /// Seconds since the actor started
    pub uptime: u64,
    pub memory_usage: MemoryUsage,
    pub rooms: RoomStats,
    pub rate_limit: RateLimitStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    /// Resident set size in MB
    pub used: u64,
    /// Total system memory in MB
    pub total: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomStats {
    pub total: usize,
    pub active: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    pub active_limits: usize,
}

/// The main ChatServer actor
///
/// Single owner of all mutable chat state; processes commands from
/// connection handlers, the heartbeat timer, and the HTTP surface.
pub struct ChatServer {
    registry: SessionRegistry,
    history: HistoryRing,
    limiter: RateLimiter,
    receiver: mpsc::Receiver<ServerCommand>,
    evict_unresponsive: bool,
    total_connections: u64,
    total_messages: u64,
    started_at: std::time::Instant,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, config: &Config) -> Self {
        Self {
            registry: SessionRegistry::new(),
            history: HistoryRing::new(config.history_capacity),
            limiter: RateLimiter::new(config.rate_limit_max, config.rate_limit_window),
            receiver,
            evict_unresponsive: config.evict_unresponsive,
            total_connections: 0,
            total_messages: 0,
            started_at: std::time::Instant::now(),
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders
    /// are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    pub fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { client_id, sender } => {
                self.handle_connect(client_id, sender);
            }
            ServerCommand::Inbound { client_id, raw } => {
                self.handle_inbound(client_id, &raw);
            }
            ServerCommand::Disconnect { client_id } => {
                self.handle_disconnect(client_id);
            }
            ServerCommand::Heartbeat => {
                self.handle_heartbeat();
            }
            ServerCommand::GetStats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    /// Handle new client connection
    fn handle_connect(&mut self, client_id: ClientId, sender: mpsc::Sender<String>) {
        self.registry.register(Connection::new(client_id, sender));
        self.total_connections += 1;
        info!("Client {} connected", client_id);
        debug!("Active connections: {}", self.registry.count());
    }

    /// Route one raw inbound frame
    ///
    /// Processing order, each step short-circuiting with a direct
    /// `error` reply: resolve connection, parse, structural validation,
    /// rate-limit admission, dispatch by type. Nothing here terminates
    /// the connection or the server.
    fn handle_inbound(&mut self, client_id: ClientId, raw: &str) {
        // The connection may have vanished mid-flight; there is no
        // reply channel left, so log and drop.
        if self.registry.get(client_id).is_none() {
            warn!("Inbound frame from unknown client {}", client_id);
            return;
        }
        self.total_messages += 1;

        let result = parse_envelope(raw).and_then(|value| {
            if !self.limiter.try_admit(client_id) {
                return Err(RouterError::RateLimited {
                    remaining: self.limiter.remaining(client_id),
                });
            }
            let frame = decode_frame(value)?;
            self.dispatch(client_id, frame)
        });

        match result {
            Ok(Some(reply)) => self.send_to(client_id, &reply),
            Ok(None) => {}
            Err(err) => {
                debug!("Rejected frame from {}: {}", client_id, err);
                let reply = OutboundFrame::new(ServerFrame::from(&err));
                self.send_to(client_id, &reply);
            }
        }
    }

    /// Dispatch a decoded frame to its handler
    fn dispatch(
        &mut self,
        client_id: ClientId,
        frame: ClientFrame,
    ) -> Result<Option<OutboundFrame>, RouterError> {
        match frame {
            ClientFrame::Join(data) => self.handle_join(client_id, &data.username),
            ClientFrame::Chat(data) => self.handle_chat(client_id, &data.content),
            ClientFrame::Ping(_) => self.handle_ping(client_id),
            ClientFrame::Typing(data) => self.handle_typing(client_id, data.is_typing),
        }
    }

    /// Handle a join (or re-join, treated as a rename)
    fn handle_join(
        &mut self,
        client_id: ClientId,
        username: &str,
    ) -> Result<Option<OutboundFrame>, RouterError> {
        validate_username(username).map_err(RouterError::InvalidUsername)?;
        let name = username.trim().to_string();

        if self.registry.is_name_taken(&name, client_id) {
            return Err(RouterError::UsernameTaken);
        }

        let previous = self
            .registry
            .get(client_id)
            .ok_or(RouterError::UnknownConnection)?
            .user
            .as_ref()
            .map(|user| user.name.clone());

        let announcement = match previous {
            // Re-join from a joined connection renames the identity,
            // keeping its color and join time.
            Some(old_name) => {
                let conn = self
                    .registry
                    .get_mut(client_id)
                    .ok_or(RouterError::UnknownConnection)?;
                if let Some(user) = conn.user.as_mut() {
                    user.name = name.clone();
                }
                info!("Client {} renamed '{}' -> '{}'", client_id, old_name, name);
                SystemMessage::new(
                    format!("{} is now known as {}", old_name, name),
                    SystemKind::System,
                )
            }
            None => {
                let user = User::new(client_id, name.clone());
                let conn = self
                    .registry
                    .get_mut(client_id)
                    .ok_or(RouterError::UnknownConnection)?;
                conn.user = Some(user);
                info!("Client {} joined as '{}'", client_id, name);
                SystemMessage::new(format!("{} joined the chat", name), SystemKind::UserJoined)
            }
        };

        self.history.append(ChatEvent::System(announcement.clone()));
        self.broadcast(
            &OutboundFrame::new(ServerFrame::System(announcement)),
            Some(client_id),
        );
        self.broadcast_user_list();

        Ok(Some(OutboundFrame::new(ServerFrame::ChatHistory(
            ChatHistoryData {
                messages: self.history.last_n(HISTORY_REPLY_LIMIT),
            },
        ))))
    }

    /// Handle a chat message from a joined connection
    fn handle_chat(
        &mut self,
        client_id: ClientId,
        content: &str,
    ) -> Result<Option<OutboundFrame>, RouterError> {
        let user = self
            .registry
            .get(client_id)
            .ok_or(RouterError::UnknownConnection)?
            .user
            .clone()
            .ok_or(RouterError::UserNotJoined)?;

        let sanitized = sanitize_content(content);
        if sanitized.is_empty() {
            return Err(RouterError::EmptyMessage);
        }

        let message = ChatMessage::new(&user, sanitized);
        self.history.append(ChatEvent::Chat(message.clone()));

        // Sender included: clients render their own echo
        self.broadcast(&OutboundFrame::new(ServerFrame::Chat(message)), None);

        Ok(None)
    }

    /// Handle an application-level ping; valid in either state
    fn handle_ping(&mut self, client_id: ClientId) -> Result<Option<OutboundFrame>, RouterError> {
        let conn = self
            .registry
            .get_mut(client_id)
            .ok_or(RouterError::UnknownConnection)?;
        conn.mark_alive();

        Ok(Some(OutboundFrame::new(ServerFrame::Pong(PongData {
            timestamp: now_rfc3339(),
        }))))
    }

    /// Handle a typing indicator from a joined connection
    fn handle_typing(
        &mut self,
        client_id: ClientId,
        is_typing: bool,
    ) -> Result<Option<OutboundFrame>, RouterError> {
        let user = self
            .registry
            .get(client_id)
            .ok_or(RouterError::UnknownConnection)?
            .user
            .clone()
            .ok_or(RouterError::UserNotJoined)?;

        self.broadcast(
            &OutboundFrame::new(ServerFrame::Typing(TypingData {
                user_id: user.id,
                username: user.name,
                user_color: user.color,
                is_typing,
                timestamp: now_rfc3339(),
            })),
            Some(client_id),
        );

        Ok(None)
    }

    /// Handle client disconnection
    ///
    /// Idempotent: the registry removal happens exactly once, so a
    /// second call for the same id is a no-op and produces no second
    /// `user_left` broadcast.
    fn handle_disconnect(&mut self, client_id: ClientId) {
        let Some(conn) = self.registry.remove(client_id) else {
            return;
        };
        self.limiter.forget(client_id);
        info!("Client {} disconnected", client_id);

        if let Some(user) = conn.user {
            let announcement = SystemMessage::new(
                format!("{} left the chat", user.name),
                SystemKind::UserLeft,
            );
            self.history.append(ChatEvent::System(announcement.clone()));
            self.broadcast(&OutboundFrame::new(ServerFrame::System(announcement)), None);
            self.broadcast_user_list();
        }

        debug!("Active connections: {}", self.registry.count());
    }

    /// Periodic liveness sweep
    ///
    /// Sends a server ping to every live connection and stamps its
    /// `last_ping_at`. With eviction enabled, connections that did not
    /// answer the previous round's ping are removed through the same
    /// disconnect path as a transport close; otherwise liveness stays
    /// advisory.
    fn handle_heartbeat(&mut self) {
        if self.evict_unresponsive {
            let stale: Vec<ClientId> = self
                .registry
                .iter()
                .filter(|conn| !conn.alive)
                .map(|conn| conn.id)
                .collect();
            for client_id in stale {
                info!("Evicting unresponsive client {}", client_id);
                self.handle_disconnect(client_id);
            }
        }

        let frame = OutboundFrame::new(ServerFrame::Ping(PingData {
            timestamp: now_rfc3339(),
        }));
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize heartbeat ping: {}", e);
                return;
            }
        };

        let evict = self.evict_unresponsive;
        for conn in self.registry.iter_mut() {
            if let Err(e) = conn.send(text.clone()) {
                warn!("Failed to send ping to client {}: {}", conn.id, e);
            }
            conn.last_ping_at = std::time::Instant::now();
            if evict {
                conn.alive = false;
            }
        }
    }

    /// Deliver one frame to every live connection, serializing once
    ///
    /// A failed send is logged and skipped; it never aborts delivery to
    /// the remaining connections, and never removes the failing
    /// connection.
    fn broadcast(&self, frame: &OutboundFrame, exclude: Option<ClientId>) {
        let text = match frame.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize broadcast frame: {}", e);
                return;
            }
        };

        for conn in self.registry.iter() {
            if Some(conn.id) == exclude {
                continue;
            }
            if let Err(e) = conn.send(text.clone()) {
                warn!("Failed to broadcast to client {}: {}", conn.id, e);
            }
        }
    }

    /// Broadcast the refreshed identity list and count to everyone
    fn broadcast_user_list(&self) {
        let users = self.registry.list_identified();
        let count = users.len();
        self.broadcast(
            &OutboundFrame::new(ServerFrame::UserList(UserListData { users })),
            None,
        );
        self.broadcast(
            &OutboundFrame::new(ServerFrame::UserCount(UserCountData { count })),
            None,
        );
    }

    /// Direct reply to a single connection
    fn send_to(&self, client_id: ClientId, frame: &OutboundFrame) {
        let Some(conn) = self.registry.get(client_id) else {
            return;
        };
        match frame.to_json() {
            Ok(text) => {
                if let Err(e) = conn.send(text) {
                    warn!("Failed to reply to client {}: {}", client_id, e);
                }
            }
            Err(e) => warn!("Failed to serialize reply for {}: {}", client_id, e),
        }
    }

    /// Read-only stats snapshot
    fn stats(&self) -> ServerStats {
        let active_connections = self.registry.count();
        ServerStats {
            total_connections: self.total_connections,
            active_connections,
            active_users: self.registry.list_identified().len(),
            total_messages: self.total_messages,
            uptime: self.started_at.elapsed().as_secs(),
            memory_usage: memory_usage(),
            rooms: RoomStats {
                total: 1,
                active: usize::from(active_connections > 0),
            },
            rate_limit: RateLimitStats {
                active_limits: self.limiter.active_windows(),
            },
        }
    }
}

/// Parse and structurally validate one raw inbound payload
///
/// Covers the checks that run before rate-limit admission: non-JSON is
/// `MalformedFrame`, a JSON value without a string `type` and object
/// `data` is `InvalidStructure`. Type dispatch, including the unknown
/// `type` rejection, happens after admission in [`decode_frame`].
fn parse_envelope(raw: &str) -> Result<serde_json::Value, RouterError> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|_| RouterError::MalformedFrame)?;

    let obj = value.as_object().ok_or_else(|| {
        RouterError::InvalidStructure("Message must be an object".to_string())
    })?;
    if !obj.get("type").is_some_and(|t| t.is_string()) {
        return Err(RouterError::InvalidStructure(
            "Message must have a type field".to_string(),
        ));
    }
    if !obj.get("data").is_some_and(|d| d.is_object()) {
        return Err(RouterError::InvalidStructure(
            "Message must have a data field".to_string(),
        ));
    }
    Ok(value)
}

/// Decode a validated envelope into a typed frame
///
/// A `type` outside the protocol is `UnknownType`; a known type whose
/// data fields do not decode is `InvalidStructure`. Both consume a
/// rate-limit slot, since admission has already happened.
fn decode_frame(value: serde_json::Value) -> Result<ClientFrame, RouterError> {
    // parse_envelope guarantees a string `type`.
    let frame_type = value["type"].as_str().unwrap_or_default().to_string();
    if !KNOWN_CLIENT_TYPES.contains(&frame_type.as_str()) {
        return Err(RouterError::UnknownType(frame_type));
    }

    serde_json::from_value(value).map_err(|_| {
        RouterError::InvalidStructure(format!("Invalid data for message type: {}", frame_type))
    })
}

/// Process memory usage, best effort
///
/// Reads /proc on Linux; reports zeros where that is unavailable.
fn memory_usage() -> MemoryUsage {
    #[cfg(target_os = "linux")]
    {
        fn read_kb(path: &str, key: &str) -> Option<u64> {
            let text = std::fs::read_to_string(path).ok()?;
            text.lines()
                .find(|line| line.starts_with(key))?
                .split_whitespace()
                .nth(1)?
                .parse()
                .ok()
        }

        let used_kb = read_kb("/proc/self/status", "VmRSS:").unwrap_or(0);
        let total_kb = read_kb("/proc/meminfo", "MemTotal:").unwrap_or(0);
        let percentage = if total_kb > 0 {
            (used_kb as f64 / total_kb as f64 * 10_000.0).round() / 100.0
        } else {
            0.0
        };
        return MemoryUsage {
            used: used_kb / 1024,
            total: total_kb / 1024,
            percentage,
        };
    }

    #[cfg(not(target_os = "linux"))]
    MemoryUsage {
        used: 0,
        total: 0,
        percentage: 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::sync::mpsc;

    /// A fake connected client: its outbound receiver and id
    struct TestClient {
        id: ClientId,
        rx: mpsc::Receiver<String>,
    }

    impl TestClient {
        /// Drain every queued frame as parsed JSON
        fn drain(&mut self) -> Vec<Value> {
            let mut frames = Vec::new();
            while let Ok(text) = self.rx.try_recv() {
                frames.push(serde_json::from_str(&text).unwrap());
            }
            frames
        }

        /// Drain and keep only frames of the given type
        fn drain_type(&mut self, frame_type: &str) -> Vec<Value> {
            self.drain()
                .into_iter()
                .filter(|f| f["type"] == frame_type)
                .collect()
        }
    }

    fn server_with(config: Config) -> ChatServer {
        let (_tx, rx) = mpsc::channel(8);
        ChatServer::new(rx, &config)
    }

    fn server() -> ChatServer {
        server_with(Config::default())
    }

    fn connect(server: &mut ChatServer) -> TestClient {
        let id = ClientId::new();
        let (tx, rx) = mpsc::channel(64);
        server.handle_command(ServerCommand::Connect {
            client_id: id,
            sender: tx,
        });
        TestClient { id, rx }
    }

    fn send(server: &mut ChatServer, client: &TestClient, raw: &str) {
        server.handle_command(ServerCommand::Inbound {
            client_id: client.id,
            raw: raw.to_string(),
        });
    }

    fn join(server: &mut ChatServer, client: &TestClient, name: &str) {
        send(
            server,
            client,
            &format!(r#"{{"type":"join","data":{{"username":"{}"}}}}"#, name),
        );
    }

    #[tokio::test]
    async fn test_join_replies_with_history_and_user_list() {
        let mut server = server();
        let mut alice = connect(&mut server);

        join(&mut server, &alice, "alice");

        let frames = alice.drain();
        let history: Vec<_> = frames.iter().filter(|f| f["type"] == "chat_history").collect();
        assert_eq!(history.len(), 1);
        // The joiner's own user_joined entry is already in history
        assert_eq!(history[0]["data"]["messages"][0]["kind"], "user_joined");

        // user_list/user_count go to everyone, including the joiner,
        // but the join announcement itself excludes the sender
        let user_list: Vec<_> = frames.iter().filter(|f| f["type"] == "user_list").collect();
        assert_eq!(user_list.len(), 1);
        assert_eq!(user_list[0]["data"]["users"][0]["name"], "alice");
        let count: Vec<_> = frames.iter().filter(|f| f["type"] == "user_count").collect();
        assert_eq!(count[0]["data"]["count"], 1);
        assert!(frames.iter().all(|f| f["type"] != "system"));
    }

    #[tokio::test]
    async fn test_join_broadcasts_presence_to_others() {
        let mut server = server();
        let mut alice = connect(&mut server);
        join(&mut server, &alice, "alice");
        alice.drain();

        let mut bob = connect(&mut server);
        join(&mut server, &bob, "bob");

        let frames = alice.drain();
        let system: Vec<_> = frames.iter().filter(|f| f["type"] == "system").collect();
        assert_eq!(system.len(), 1);
        assert_eq!(system[0]["data"]["kind"], "user_joined");
        assert_eq!(system[0]["data"]["content"], "bob joined the chat");

        let user_list: Vec<_> = frames.iter().filter(|f| f["type"] == "user_list").collect();
        assert_eq!(user_list.len(), 1);
        assert_eq!(user_list[0]["data"]["users"].as_array().unwrap().len(), 2);

        let count: Vec<_> = frames.iter().filter(|f| f["type"] == "user_count").collect();
        assert_eq!(count[0]["data"]["count"], 2);

        // Bob got history but not his own user_joined broadcast
        let bob_frames = bob.drain();
        assert!(bob_frames.iter().all(|f| f["type"] != "system"));
        assert!(bob_frames.iter().any(|f| f["type"] == "chat_history"));
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected_case_insensitive() {
        let mut server = server();
        let mut alice = connect(&mut server);
        join(&mut server, &alice, "alice");
        alice.drain();

        let mut imposter = connect(&mut server);
        join(&mut server, &imposter, "ALICE");

        let errors = imposter.drain_type("error");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["data"]["code"], "USERNAME_TAKEN");
        // No membership change reached alice
        assert!(alice.drain().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_username_rejected() {
        let mut server = server();
        let mut client = connect(&mut server);

        join(&mut server, &client, "x");
        let errors = client.drain_type("error");
        assert_eq!(errors[0]["data"]["code"], "INVALID_USERNAME");

        join(&mut server, &client, "system");
        let errors = client.drain_type("error");
        assert_eq!(errors[0]["data"]["code"], "INVALID_USERNAME");
    }

    #[tokio::test]
    async fn test_rejoin_renames_keeping_color() {
        let mut server = server();
        let mut alice = connect(&mut server);
        let mut bob = connect(&mut server);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        let color = alice.drain_type("user_list")[0]["data"]["users"]
            .as_array()
            .unwrap()
            .iter()
            .find(|u| u["name"] == "alice")
            .unwrap()["color"]
            .clone();
        bob.drain();

        join(&mut server, &alice, "alicia");

        let frames = bob.drain();
        let system: Vec<_> = frames.iter().filter(|f| f["type"] == "system").collect();
        assert_eq!(system[0]["data"]["kind"], "system");
        assert_eq!(system[0]["data"]["content"], "alice is now known as alicia");

        let users = frames
            .iter()
            .find(|f| f["type"] == "user_list")
            .unwrap()["data"]["users"]
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(users.len(), 2);
        let alicia = users.iter().find(|u| u["name"] == "alicia").unwrap();
        assert_eq!(alicia["color"], color);
    }

    #[tokio::test]
    async fn test_rejoin_to_taken_name_rejected() {
        let mut server = server();
        let mut alice = connect(&mut server);
        let mut bob = connect(&mut server);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        alice.drain();
        bob.drain();

        join(&mut server, &bob, "Alice");
        let errors = bob.drain_type("error");
        assert_eq!(errors[0]["data"]["code"], "USERNAME_TAKEN");

        // Renaming to your own name (different case) is allowed
        join(&mut server, &alice, "Alice");
        assert!(alice.drain_type("error").is_empty());
    }

    #[tokio::test]
    async fn test_chat_broadcast_includes_sender() {
        let mut server = server();
        let mut alice = connect(&mut server);
        let mut bob = connect(&mut server);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        alice.drain();
        bob.drain();

        send(&mut server, &alice, r#"{"type":"chat","data":{"content":"hi"}}"#);

        for client in [&mut alice, &mut bob] {
            let chats = client.drain_type("chat");
            assert_eq!(chats.len(), 1);
            assert_eq!(chats[0]["data"]["content"], "hi");
            assert_eq!(chats[0]["data"]["username"], "alice");
        }
    }

    #[tokio::test]
    async fn test_chat_requires_join() {
        let mut server = server();
        let mut client = connect(&mut server);

        send(&mut server, &client, r#"{"type":"chat","data":{"content":"hi"}}"#);

        let errors = client.drain_type("error");
        assert_eq!(errors[0]["data"]["code"], "USER_NOT_JOINED");
    }

    #[tokio::test]
    async fn test_empty_chat_rejected_without_broadcast() {
        let mut server = server();
        let mut alice = connect(&mut server);
        let mut bob = connect(&mut server);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        alice.drain();
        bob.drain();

        send(&mut server, &alice, r#"{"type":"chat","data":{"content":"   "}}"#);

        let errors = alice.drain_type("error");
        assert_eq!(errors[0]["data"]["code"], "EMPTY_MESSAGE");
        assert!(bob.drain().is_empty());
    }

    #[tokio::test]
    async fn test_chat_content_truncated() {
        let mut server = server();
        let mut alice = connect(&mut server);
        join(&mut server, &alice, "alice");
        alice.drain();

        let long = "z".repeat(600);
        send(
            &mut server,
            &alice,
            &format!(r#"{{"type":"chat","data":{{"content":"{}"}}}}"#, long),
        );

        let chats = alice.drain_type("chat");
        assert_eq!(chats[0]["data"]["content"].as_str().unwrap().len(), 500);
    }

    #[tokio::test]
    async fn test_ping_gets_pong_in_any_state() {
        let mut server = server();
        let mut client = connect(&mut server);

        send(&mut server, &client, r#"{"type":"ping","data":{}}"#);
        let pongs = client.drain_type("pong");
        assert_eq!(pongs.len(), 1);
        assert!(pongs[0]["data"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_typing_broadcast_excludes_sender() {
        let mut server = server();
        let mut alice = connect(&mut server);
        let mut bob = connect(&mut server);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        alice.drain();
        bob.drain();

        send(&mut server, &alice, r#"{"type":"typing","data":{"isTyping":true}}"#);

        let bob_typing = bob.drain_type("typing");
        assert_eq!(bob_typing.len(), 1);
        assert_eq!(bob_typing[0]["data"]["username"], "alice");
        assert_eq!(bob_typing[0]["data"]["isTyping"], true);
        assert!(alice.drain_type("typing").is_empty());
    }

    #[tokio::test]
    async fn test_typing_requires_join() {
        let mut server = server();
        let mut client = connect(&mut server);

        send(&mut server, &client, r#"{"type":"typing","data":{"isTyping":true}}"#);
        let errors = client.drain_type("error");
        assert_eq!(errors[0]["data"]["code"], "USER_NOT_JOINED");
    }

    #[tokio::test]
    async fn test_malformed_and_structural_errors() {
        let mut server = server();
        let mut client = connect(&mut server);

        send(&mut server, &client, "not json");
        assert_eq!(client.drain_type("error")[0]["data"]["code"], "INVALID_FORMAT");

        send(&mut server, &client, r#"{"type":"chat"}"#);
        assert_eq!(client.drain_type("error")[0]["data"]["code"], "INVALID_STRUCTURE");

        send(&mut server, &client, r#"{"data":{}}"#);
        assert_eq!(client.drain_type("error")[0]["data"]["code"], "INVALID_STRUCTURE");

        send(&mut server, &client, r#"{"type":"shout","data":{}}"#);
        let errors = client.drain_type("error");
        assert_eq!(errors[0]["data"]["code"], "UNKNOWN_TYPE");
        assert_eq!(errors[0]["data"]["message"], "Unknown message type: shout");
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_with_remaining_hint() {
        let mut config = Config::default();
        config.rate_limit_max = 3;
        let mut server = server_with(config);
        let mut client = connect(&mut server);

        for _ in 0..3 {
            send(&mut server, &client, r#"{"type":"ping","data":{}}"#);
        }
        assert_eq!(client.drain_type("pong").len(), 3);

        send(&mut server, &client, r#"{"type":"ping","data":{}}"#);
        let errors = client.drain_type("error");
        assert_eq!(errors[0]["data"]["code"], "RATE_LIMITED");
        assert_eq!(errors[0]["data"]["remaining"], 0);
    }

    #[tokio::test]
    async fn test_unknown_type_counts_against_rate_limit() {
        let mut config = Config::default();
        config.rate_limit_max = 1;
        let mut server = server_with(config);
        let mut client = connect(&mut server);

        // The first unknown-type frame is admitted, consuming the only
        // slot in the window.
        send(&mut server, &client, r#"{"type":"shout","data":{}}"#);
        assert_eq!(client.drain_type("error")[0]["data"]["code"], "UNKNOWN_TYPE");

        // Once the window is exhausted, admission rejects before the
        // type is even looked at.
        send(&mut server, &client, r#"{"type":"shout","data":{}}"#);
        assert_eq!(client.drain_type("error")[0]["data"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_unknown_connection_frames_not_counted() {
        let mut server = server();
        let _client = connect(&mut server);

        server.handle_command(ServerCommand::Inbound {
            client_id: ClientId::new(),
            raw: r#"{"type":"ping","data":{}}"#.to_string(),
        });

        let (reply_tx, reply_rx) = oneshot::channel();
        server.handle_command(ServerCommand::GetStats { reply: reply_tx });
        let stats = reply_rx.await.unwrap();
        assert_eq!(stats.total_messages, 0);
    }

    #[tokio::test]
    async fn test_disconnect_broadcasts_user_left_once() {
        let mut server = server();
        let mut alice = connect(&mut server);
        let mut bob = connect(&mut server);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        alice.drain();
        bob.drain();

        server.handle_command(ServerCommand::Disconnect { client_id: alice.id });
        server.handle_command(ServerCommand::Disconnect { client_id: alice.id });

        let frames = bob.drain();
        let left: Vec<_> = frames
            .iter()
            .filter(|f| f["type"] == "system" && f["data"]["kind"] == "user_left")
            .collect();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0]["data"]["content"], "alice left the chat");

        let counts: Vec<_> = frames.iter().filter(|f| f["type"] == "user_count").collect();
        assert_eq!(counts.last().unwrap()["data"]["count"], 1);
    }

    #[tokio::test]
    async fn test_anonymous_disconnect_is_silent() {
        let mut server = server();
        let mut alice = connect(&mut server);
        join(&mut server, &alice, "alice");
        alice.drain();

        let anon = connect(&mut server);
        server.handle_command(ServerCommand::Disconnect { client_id: anon.id });

        assert!(alice.drain().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_pings_all_connections() {
        let mut server = server();
        let mut alice = connect(&mut server);
        let mut bob = connect(&mut server);

        server.handle_command(ServerCommand::Heartbeat);

        for client in [&mut alice, &mut bob] {
            let pings = client.drain_type("ping");
            assert_eq!(pings.len(), 1);
        }
        // Advisory mode: nobody was evicted
        server.handle_command(ServerCommand::Heartbeat);
        assert_eq!(alice.drain_type("ping").len(), 1);
        assert_eq!(bob.drain_type("ping").len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_sweep_removes_silent_connections() {
        let mut config = Config::default();
        config.evict_unresponsive = true;
        let mut server = server_with(config);
        let mut alice = connect(&mut server);
        let mut bob = connect(&mut server);
        join(&mut server, &alice, "alice");
        join(&mut server, &bob, "bob");
        alice.drain();
        bob.drain();

        // First sweep clears alive flags; alice answers, bob stays silent
        server.handle_command(ServerCommand::Heartbeat);
        send(&mut server, &alice, r#"{"type":"ping","data":{}}"#);

        server.handle_command(ServerCommand::Heartbeat);

        let frames = alice.drain();
        assert!(frames
            .iter()
            .any(|f| f["type"] == "system" && f["data"]["content"] == "bob left the chat"));

        let (reply_tx, reply_rx) = oneshot::channel();
        server.handle_command(ServerCommand::GetStats { reply: reply_tx });
        let stats = reply_rx.await.unwrap();
        assert_eq!(stats.active_connections, 1);
    }

    #[tokio::test]
    async fn test_broadcast_survives_dead_peer() {
        let mut server = server();
        let mut alice = connect(&mut server);
        let dead = connect(&mut server);
        join(&mut server, &alice, "alice");
        alice.drain();
        drop(dead.rx);

        send(&mut server, &alice, r#"{"type":"chat","data":{"content":"still here"}}"#);

        let chats = alice.drain_type("chat");
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0]["data"]["content"], "still here");
    }

    #[tokio::test]
    async fn test_history_reply_capped_at_fifty() {
        let mut config = Config::default();
        config.rate_limit_max = 1_000;
        let mut server = server_with(config);
        let mut alice = connect(&mut server);
        join(&mut server, &alice, "alice");
        alice.drain();

        for n in 0..60 {
            send(
                &mut server,
                &alice,
                &format!(r#"{{"type":"chat","data":{{"content":"m{}"}}}}"#, n),
            );
        }
        alice.drain();

        let mut bob = connect(&mut server);
        join(&mut server, &bob, "bob");
        let history = bob.drain_type("chat_history");
        let messages = history[0]["data"]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 50);
    }

    #[tokio::test]
    async fn test_stats_snapshot() {
        let mut server = server();
        let alice = connect(&mut server);
        join(&mut server, &alice, "alice");
        let _anon = connect(&mut server);

        let (reply_tx, reply_rx) = oneshot::channel();
        server.handle_command(ServerCommand::GetStats { reply: reply_tx });
        let stats = reply_rx.await.unwrap();

        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.active_connections, 2);
        assert_eq!(stats.active_users, 1);
        assert_eq!(stats.total_messages, 1);
        assert_eq!(stats.rooms.total, 1);
        assert_eq!(stats.rooms.active, 1);
    }
}
