use crate::cluster::ClusterRegistry;
use crate::id_gen::RoomIdGenerator;
use crate::lobby::Lobby;
use shared::UserId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Everything the master's sessions share, constructed once in `main`
pub struct MasterState {
    pub lobby: Lobby,
    pub cluster: ClusterRegistry,
    pub room_ids: RoomIdGenerator,
    pub version_key: String,
    next_user_id: AtomicU64,
}

impl MasterState {
    pub fn new(version_key: impl Into<String>) -> Self {
        Self {
            lobby: Lobby::new(),
            cluster: ClusterRegistry::new(),
            room_ids: RoomIdGenerator::default(),
            version_key: version_key.into(),
            next_user_id: AtomicU64::new(1),
        }
    }

    pub fn next_user_id(&self) -> UserId {
        self.next_user_id.fetch_add(1, Ordering::Relaxed)
    }
}
