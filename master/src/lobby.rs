//! Master-side room directory and connected user registry
//!
//! Both are [`ShardedMap`] instances. The room directory only holds the
//! projection nodes report through `UpdateRoom`; the game state itself stays
//! on the node.

use crate::cluster::NodeDescriptor;
use crate::sharded_map::ShardedMap;
use log::{debug, info, warn};
use shared::transport::Connection;
use shared::{NodeId, RoomId, RoomInfo, UserId};
use std::sync::{Arc, Weak};

/// Rooms churn less than users and are read more often per entry
pub const ROOM_SHARDS: usize = 128;
pub const USER_SHARDS: usize = 512;

/// A room as the master knows it
///
/// The owning node is referenced, not owned: the cluster registry decides how
/// long a node lives. An entry is always created from a live node.
#[derive(Debug, Clone)]
pub struct RoomDirectoryEntry {
    pub id: RoomId,
    pub name: String,
    pub player_count: u32,
    pub player_max: u32,
    pub state: i32,
    node_id: NodeId,
    node: Weak<NodeDescriptor>,
}

impl RoomDirectoryEntry {
    pub fn new(info: &RoomInfo, node: &Arc<NodeDescriptor>) -> Self {
        Self {
            id: info.id,
            name: info.name.clone(),
            player_count: info.player_count,
            player_max: info.player_max,
            state: info.state,
            node_id: node.id,
            node: Arc::downgrade(node),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The owning node, if it is still alive
    pub fn node(&self) -> Option<Arc<NodeDescriptor>> {
        self.node.upgrade()
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.name.clone(),
            player_count: self.player_count,
            player_max: self.player_max,
            state: self.state,
        }
    }

    fn apply(&mut self, info: &RoomInfo) {
        self.name = info.name.clone();
        self.player_count = info.player_count;
        self.player_max = info.player_max;
        self.state = info.state;
    }
}

/// Outcome of applying a node's room update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomUpdate {
    Created,
    Updated,
    Removed,
    /// Removal of a room the directory does not know
    Unknown,
    /// The room belongs to another node
    Rejected,
}

pub struct Lobby {
    rooms: ShardedMap<RoomId, RoomDirectoryEntry>,
    users: ShardedMap<UserId, Connection>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::with_shards(ROOM_SHARDS, USER_SHARDS)
    }

    pub fn with_shards(room_shards: usize, user_shards: usize) -> Self {
        Self {
            rooms: ShardedMap::new(room_shards),
            users: ShardedMap::new(user_shards),
        }
    }

    pub fn get_room(&self, id: RoomId) -> Option<RoomDirectoryEntry> {
        self.rooms.get(&id)
    }

    pub fn set_room(&self, entry: RoomDirectoryEntry) {
        self.rooms.set(entry.id, entry);
    }

    pub fn remove_room(&self, id: RoomId) -> Option<RoomDirectoryEntry> {
        self.rooms.remove(&id)
    }

    pub fn has_room(&self, id: RoomId) -> bool {
        self.rooms.contains(&id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.count()
    }

    /// Applies a full room projection pushed by `node`
    ///
    /// Updates from one node arrive in order on its link, so the read-then-write
    /// here only races with other nodes, and those are rejected by ownership.
    pub fn apply_update(
        &self,
        node: &Arc<NodeDescriptor>,
        info: &RoomInfo,
        remove: bool,
    ) -> RoomUpdate {
        let existing = self.rooms.get(&info.id);

        if let Some(entry) = &existing {
            if entry.node_id != node.id {
                warn!(
                    "Node {} tried to update room {} owned by node {}",
                    node.id, info.id, entry.node_id
                );
                return RoomUpdate::Rejected;
            }
        }

        match (existing, remove) {
            (Some(_), true) => {
                self.rooms.remove(&info.id);
                node.decrement_rooms();
                info!("Room {} on node {} removed", info.id, node.id);
                RoomUpdate::Removed
            }
            (None, true) => {
                debug!("Removal of unknown room {} from node {}", info.id, node.id);
                RoomUpdate::Unknown
            }
            (Some(_), false) => {
                self.rooms.update(&info.id, |entry| entry.apply(info));
                debug!(
                    "Room {} now has {}/{} players",
                    info.id, info.player_count, info.player_max
                );
                RoomUpdate::Updated
            }
            (None, false) => {
                self.rooms.set(info.id, RoomDirectoryEntry::new(info, node));
                node.increment_rooms();
                info!("Room {} created on node {}", info.id, node.id);
                RoomUpdate::Created
            }
        }
    }

    /// Drops every room owned by `node_id`. Returns how many were removed.
    pub fn remove_rooms_from_node(&self, node_id: NodeId) -> usize {
        self.rooms.retain(|_, entry| entry.node_id != node_id)
    }

    /// Rooms hosted by live nodes in `region`
    pub fn rooms_in_region(&self, region: &str) -> Vec<RoomInfo> {
        self.rooms
            .snapshot()
            .into_iter()
            .filter(|(_, entry)| {
                entry
                    .node()
                    .map(|node| node.region == region)
                    .unwrap_or(false)
            })
            .map(|(_, entry)| entry.info())
            .collect()
    }

    pub fn set_user(&self, user_id: UserId, connection: Connection) {
        self.users.set(user_id, connection);
    }

    pub fn get_user(&self, user_id: UserId) -> Option<Connection> {
        self.users.get(&user_id)
    }

    pub fn remove_user(&self, user_id: UserId) -> Option<Connection> {
        self.users.remove(&user_id)
    }

    pub fn user_count(&self) -> usize {
        self.users.count()
    }
}

impl Default for Lobby {
    fn default() -> Self {
        Self::new()
    }
}
