use crate::room::Room;
use log::{info, warn};
use parking_lot::RwLock;
use shared::RoomId;
use std::collections::HashMap;
use std::sync::Arc;

/// Rooms hosted by this node
pub struct NodeLobby {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    max_players: u32,
}

impl NodeLobby {
    pub fn new(max_players: u32) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            max_players,
        }
    }

    /// Creates a room under `id`. Returns `None` if the id is taken.
    pub fn create_room(&self, id: RoomId) -> Option<Arc<Room>> {
        let mut rooms = self.rooms.write();
        if rooms.contains_key(&id) {
            warn!("Trying to create already existing room {}", id);
            return None;
        }

        let room = Arc::new(Room::new(id, self.max_players));
        rooms.insert(id, Arc::clone(&room));
        info!("Room {} created", id);
        Some(room)
    }

    pub fn get_room(&self, id: RoomId) -> Option<Arc<Room>> {
        self.rooms.read().get(&id).cloned()
    }

    /// Removes `room` if it is still the one registered under its id
    pub fn remove_room(&self, room: &Arc<Room>) -> bool {
        let mut rooms = self.rooms.write();
        match rooms.get(&room.id) {
            Some(current) if Arc::ptr_eq(current, room) => {
                rooms.remove(&room.id);
                info!("Room {} removed", room.id);
                true
            }
            _ => false,
        }
    }

    pub fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_fails_for_existing_room() {
        let lobby = NodeLobby::new(4);
        assert!(lobby.create_room(1).is_some());
        assert!(lobby.create_room(1).is_none());
        assert_eq!(lobby.len(), 1);
    }

    #[test]
    fn test_rooms_use_configured_capacity() {
        let lobby = NodeLobby::new(2);
        let room = lobby.create_room(5).unwrap();
        assert_eq!(room.info().player_max, 2);
    }

    #[test]
    fn test_remove_only_matching_instance() {
        let lobby = NodeLobby::new(4);
        let original = lobby.create_room(7).unwrap();
        assert!(lobby.remove_room(&original));
        assert!(lobby.get_room(7).is_none());

        let replacement = lobby.create_room(7).unwrap();
        assert!(!lobby.remove_room(&original));
        assert!(Arc::ptr_eq(&lobby.get_room(7).unwrap(), &replacement));
    }

    #[test]
    fn test_rooms_snapshot() {
        let lobby = NodeLobby::new(4);
        assert!(lobby.is_empty());
        lobby.create_room(1);
        lobby.create_room(2);
        let mut ids: Vec<RoomId> = lobby.rooms().iter().map(|r| r.id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
    }
}
