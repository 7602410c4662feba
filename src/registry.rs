//! Session registry
//!
//! The authoritative map of connection id → live connection. Owned
//! exclusively by the `ChatServer` actor, so all mutation happens on one
//! logical thread of control and no locking is needed.

use std::collections::HashMap;

use crate::client::Connection;
use crate::types::{ClientId, User};

/// Registry of all live connections
#[derive(Debug, Default)]
pub struct SessionRegistry {
    connections: HashMap<ClientId, Connection>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    /// Store a freshly opened connection in un-joined state
    pub fn register(&mut self, connection: Connection) -> ClientId {
        let id = connection.id;
        self.connections.insert(id, connection);
        id
    }

    pub fn get(&self, id: ClientId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Connection> {
        self.connections.get_mut(&id)
    }

    /// Remove a connection. Idempotent: an absent id is a no-op
    /// returning None.
    pub fn remove(&mut self, id: ClientId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    /// Snapshot of all joined identities
    pub fn list_identified(&self) -> Vec<User> {
        self.connections
            .values()
            .filter_map(|conn| conn.user.clone())
            .collect()
    }

    /// Number of registered connections (joined or not)
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Whether any other connection's identity uses this name
    /// (case-insensitive)
    pub fn is_name_taken(&self, name: &str, exclude: ClientId) -> bool {
        self.connections.values().any(|conn| {
            conn.id != exclude
                && conn
                    .user
                    .as_ref()
                    .is_some_and(|user| user.name.eq_ignore_ascii_case(name))
        })
    }

    /// Iterate all live connections (broadcast fan-out)
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Iterate all live connections mutably (heartbeat stamping)
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Connection> {
        self.connections.values_mut()
    }
}
