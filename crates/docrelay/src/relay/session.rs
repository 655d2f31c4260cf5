use tracing::{debug, info, warn};

use super::{deliver, fan_out, Connection, ConnectionId, Outbound, Relay, RelayInner};
use crate::protocol::{Connected, Membership, ServerMessage, UpdateKind};

/// Identity and target room requested by a connecting client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub username: String,
    pub room: String,
}

impl JoinParams {
    /// Resolve the join parameters from a raw query string.
    ///
    /// Never fails: fragments without `=` are skipped, and a missing or empty
    /// `username` or `room` falls back to its default. Values are form-decoded
    /// and the last occurrence of a key wins.
    pub fn parse(query: Option<&str>, connection_id: &str, default_room: &str) -> Self {
        let mut username = None;
        let mut room = None;

        for fragment in query.unwrap_or_default().split('&') {
            if !fragment.contains('=') {
                continue;
            }
            let Some((key, value)) = url::form_urlencoded::parse(fragment.as_bytes()).next()
            else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "username" => username = Some(value.into_owned()),
                "room" => room = Some(value.into_owned()),
                _ => {}
            }
        }

        Self {
            username: username.unwrap_or_else(|| default_username(connection_id)),
            room: room.unwrap_or_else(|| default_room.to_string()),
        }
    }
}

/// Display name given to clients that do not choose one
pub fn default_username(connection_id: &str) -> String {
    let prefix: String = connection_id.chars().take(8).collect();
    format!("User_{}", prefix)
}

/// A session as seen at the moment it joined or left its room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub username: String,
    pub room: String,
    /// Room size right after the join or leave
    pub users_count: usize,
}

impl Relay {
    /// Register a new connection and join it to its room.
    ///
    /// The joiner receives the room's cached document snapshot, then the cached
    /// awareness snapshot, then a `connected` acknowledgement. Every other
    /// member receives `user-joined`. Returns None if the id is already
    /// registered.
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        query: Option<&str>,
        outbound: Outbound,
    ) -> Option<SessionInfo> {
        let params = JoinParams::parse(query, &connection_id, &self.default_room);

        let mut inner = self.inner.lock().await;
        let RelayInner { connections, rooms } = &mut *inner;

        let registered = connections.insert(Connection {
            id: connection_id.clone(),
            username: params.username.clone(),
            room: params.room.clone(),
            outbound: outbound.clone(),
        });
        if !registered {
            warn!("Ignoring repeated connect for connection {}", connection_id);
            return None;
        }

        let room = rooms.join(&params.room, connection_id.clone());
        let users_count = room.member_count();

        for kind in [UpdateKind::Document, UpdateKind::Awareness] {
            if let Some(snapshot) = room.snapshot(kind) {
                debug!(
                    "Replaying {} snapshot ({} bytes) of room '{}' to {}",
                    kind,
                    snapshot.len(),
                    params.room,
                    connection_id
                );
                deliver(
                    &connection_id,
                    &outbound,
                    ServerMessage::update(kind, snapshot.clone()),
                );
            }
        }

        let joined = ServerMessage::UserJoined(Membership {
            username: params.username.clone(),
            users_count,
        });
        fan_out(connections, room, &connection_id, &joined);

        let ack = ServerMessage::Connected(Connected {
            message: format!("Welcome {}!", params.username),
            username: params.username.clone(),
            room: params.room.clone(),
            users_count,
        });
        deliver(&connection_id, &outbound, ack);

        info!(
            "Connection {} joined room '{}' as {} ({} members)",
            connection_id, params.room, params.username, users_count
        );

        Some(SessionInfo {
            username: params.username,
            room: params.room,
            users_count,
        })
    }

    /// Remove a connection and take it out of its room.
    ///
    /// Remaining members receive `user-left`; a room left empty is dropped with
    /// its snapshots. Unknown connection ids are ignored.
    pub async fn disconnect(&self, connection_id: &str) -> Option<SessionInfo> {
        let mut inner = self.inner.lock().await;
        let RelayInner { connections, rooms } = &mut *inner;

        let Some(connection) = connections.remove(connection_id) else {
            debug!("Ignoring disconnect for unknown connection {}", connection_id);
            return None;
        };

        let users_count = rooms.leave(&connection.room, connection_id).unwrap_or(0);
        if users_count > 0 {
            if let Some(room) = rooms.get(&connection.room) {
                let left = ServerMessage::UserLeft(Membership {
                    username: connection.username.clone(),
                    users_count,
                });
                fan_out(connections, room, connection_id, &left);
            }
        }

        info!(
            "Connection {} ({}) left room '{}' ({} members remaining)",
            connection_id, connection.username, connection.room, users_count
        );

        Some(SessionInfo {
            username: connection.username,
            room: connection.room,
            users_count,
        })
    }
}
