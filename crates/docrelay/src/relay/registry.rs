use std::collections::HashMap;

use super::{ConnectionId, Outbound};

/// Session metadata for one live connection
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub username: String,
    pub room: String,
    /// Queue drained by the connection's writer task
    pub outbound: Outbound,
}

/// Maps active connection ids to their session metadata
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection.
    ///
    /// Returns false and leaves the registry untouched if the id is already registered.
    pub fn insert(&mut self, connection: Connection) -> bool {
        if self.connections.contains_key(&connection.id) {
            return false;
        }
        self.connections.insert(connection.id.clone(), connection);
        true
    }

    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Connection> {
        self.connections.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
