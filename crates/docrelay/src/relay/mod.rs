//! Room membership, snapshot caching and fan-out.
//!
//! The connection registry and the room directory live behind one mutex so that
//! every connect, disconnect and update is applied as a single step. Outbound
//! messages are queued on each connection's unbounded channel while the lock is
//! held; the socket writes themselves happen in the connection's writer task.

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::protocol::{Blob, ServerMessage, UpdateKind};

pub mod directory;
pub mod registry;
pub mod session;
pub mod update;

pub use directory::{Room, RoomDirectory};
pub use registry::{Connection, ConnectionRegistry};
pub use session::{JoinParams, SessionInfo};

/// Opaque connection identifier assigned by the transport
pub type ConnectionId = String;

/// Sending half of a connection's outbound queue
pub type Outbound = mpsc::UnboundedSender<ServerMessage>;

/// Room joined by clients that do not name one
pub const DEFAULT_ROOM: &str = "default-room";

#[derive(Debug, Default)]
struct RelayInner {
    connections: ConnectionRegistry,
    rooms: RoomDirectory,
}

/// Shared relay state for all connections of a server process
#[derive(Debug)]
pub struct Relay {
    inner: Mutex<RelayInner>,
    default_room: String,
}

impl Relay {
    /// Create an empty relay using [`DEFAULT_ROOM`] as the fallback room
    pub fn new() -> Self {
        Self::with_default_room(DEFAULT_ROOM)
    }

    /// Create an empty relay with a custom fallback room
    pub fn with_default_room(default_room: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(RelayInner::default()),
            default_room: default_room.into(),
        }
    }

    /// Room joined by clients that do not name one
    pub fn default_room(&self) -> &str {
        &self.default_room
    }

    /// Number of registered connections
    pub async fn connection_count(&self) -> usize {
        self.inner.lock().await.connections.len()
    }

    /// Number of live rooms
    pub async fn room_count(&self) -> usize {
        self.inner.lock().await.rooms.len()
    }

    pub async fn has_room(&self, room: &str) -> bool {
        self.inner.lock().await.rooms.contains(room)
    }

    /// List all live room names
    pub async fn room_names(&self) -> Vec<String> {
        self.inner.lock().await.rooms.room_names()
    }

    /// Current member count of a room, zero if the room does not exist
    pub async fn member_count(&self, room: &str) -> usize {
        self.inner
            .lock()
            .await
            .rooms
            .get(room)
            .map_or(0, Room::member_count)
    }

    /// The cached snapshot of the given kind for a room
    pub async fn snapshot(&self, room: &str, kind: UpdateKind) -> Option<Blob> {
        self.inner
            .lock()
            .await
            .rooms
            .get(room)
            .and_then(|room| room.snapshot(kind).cloned())
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue a message for one connection.
///
/// A closed queue means the connection is going away; the failure is logged and
/// otherwise ignored.
fn deliver(id: &str, outbound: &Outbound, message: ServerMessage) -> bool {
    match outbound.send(message) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to send {} to connection {}", e.0.event_name(), id);
            false
        }
    }
}

/// Queue a message for every member of `room` except `sender`.
///
/// Returns the number of members the message was queued for.
fn fan_out(
    connections: &ConnectionRegistry,
    room: &Room,
    sender: &str,
    message: &ServerMessage,
) -> usize {
    let mut delivered = 0;
    for member in room.members().filter(|member| member.as_str() != sender) {
        match connections.get(member) {
            Some(connection) => {
                if deliver(member, &connection.outbound, message.clone()) {
                    delivered += 1;
                }
            }
            None => warn!("Room member {} has no registered connection", member),
        }
    }
    delivered
}
