use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::ConnectionId;
use crate::protocol::{Blob, UpdateKind};

/// A named broadcast domain and its cached snapshots
#[derive(Debug, Default)]
pub struct Room {
    members: HashSet<ConnectionId>,
    document: Option<Blob>,
    awareness: Option<Blob>,
}

impl Room {
    fn new() -> Self {
        Self::default()
    }

    /// Ids of the current members, in no particular order
    pub fn members(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.iter()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// The most recent payload of the given kind, if any has been received
    pub fn snapshot(&self, kind: UpdateKind) -> Option<&Blob> {
        match kind {
            UpdateKind::Document => self.document.as_ref(),
            UpdateKind::Awareness => self.awareness.as_ref(),
        }
    }

    /// Overwrite the cached payload of the given kind
    pub fn store(&mut self, kind: UpdateKind, payload: Blob) {
        match kind {
            UpdateKind::Document => self.document = Some(payload),
            UpdateKind::Awareness => self.awareness = Some(payload),
        }
    }
}

/// Maps room names to rooms.
///
/// A room is present exactly while it has at least one member.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, Room>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member to a room, creating the room on first reference
    pub fn join(&mut self, name: &str, id: ConnectionId) -> &mut Room {
        let room = self.rooms.entry(name.to_string()).or_insert_with(|| {
            info!("Creating room '{}'", name);
            Room::new()
        });
        room.members.insert(id);
        room
    }

    /// Remove a member from a room.
    ///
    /// Returns the number of members left, or None if the connection was not a
    /// member. A room whose last member leaves is removed together with its
    /// cached snapshots.
    pub fn leave(&mut self, name: &str, id: &str) -> Option<usize> {
        let room = self.rooms.get_mut(name)?;
        if !room.members.remove(id) {
            debug!("Connection {} is not a member of room '{}'", id, name);
            return None;
        }

        let remaining = room.members.len();
        if remaining == 0 {
            self.rooms.remove(name);
            info!("Removed empty room '{}'", name);
        }
        Some(remaining)
    }

    pub fn get(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Room> {
        self.rooms.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    /// List all room names
    pub fn room_names(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_join_creates_room_lazily() {
        let mut directory = RoomDirectory::new();
        assert!(directory.is_empty());

        let room = directory.join("doc1", "c1".to_string());
        assert_eq!(room.member_count(), 1);
        assert!(room.snapshot(UpdateKind::Document).is_none());
        assert!(room.snapshot(UpdateKind::Awareness).is_none());

        directory.join("doc1", "c2".to_string());
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get("doc1").unwrap().member_count(), 2);
    }

    #[test]
    fn test_last_leave_drops_room_and_snapshots() {
        let mut directory = RoomDirectory::new();
        directory.join("doc1", "c1".to_string());
        directory.join("doc1", "c2".to_string());
        directory
            .get_mut("doc1")
            .unwrap()
            .store(UpdateKind::Document, Arc::new(vec![1, 2, 3]));

        assert_eq!(directory.leave("doc1", "c1"), Some(1));
        assert!(directory.contains("doc1"));

        assert_eq!(directory.leave("doc1", "c2"), Some(0));
        assert!(!directory.contains("doc1"));

        let room = directory.join("doc1", "c3".to_string());
        assert!(room.snapshot(UpdateKind::Document).is_none());
    }

    #[test]
    fn test_leave_by_non_member_is_ignored() {
        let mut directory = RoomDirectory::new();
        directory.join("doc1", "c1".to_string());

        assert_eq!(directory.leave("doc1", "c2"), None);
        assert_eq!(directory.leave("missing", "c1"), None);
        assert_eq!(directory.get("doc1").unwrap().member_count(), 1);
    }

    #[test]
    fn test_store_overwrites_per_kind() {
        let mut directory = RoomDirectory::new();
        let room = directory.join("doc1", "c1".to_string());

        room.store(UpdateKind::Document, Arc::new(vec![1]));
        room.store(UpdateKind::Document, Arc::new(vec![2]));
        room.store(UpdateKind::Awareness, Arc::new(vec![9]));

        assert_eq!(room.snapshot(UpdateKind::Document).unwrap().as_slice(), &[2]);
        assert_eq!(room.snapshot(UpdateKind::Awareness).unwrap().as_slice(), &[9]);
    }
}
