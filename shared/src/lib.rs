use serde::{Deserialize, Serialize};

pub mod config;
pub mod handoff;
pub mod logging;
pub mod transport;
pub mod utils;

pub type UserId = u64;
pub type RoomId = u64;
pub type NodeId = u64;

/// Version key clients must present to the master unless configured otherwise
pub const DEFAULT_VERSION_KEY: &str = "demo";

/// Which master request a handoff token was minted for.
///
/// The node creates the room for `Create` and looks up an existing one for `Join`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RoomRequestKind {
    Create,
    Join,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    // Client -> master
    Hello {
        version_key: String,
    },
    CreateRoom {
        region: String,
    },
    JoinRoom {
        room_id: RoomId,
    },
    ListRooms {
        region: String,
    },

    // Master -> client
    Welcome {
        user_id: UserId,
    },
    RoomGrant {
        request: RoomRequestKind,
        success: bool,
        room_id: RoomId,
        node_address: String,
        token: Vec<u8>,
    },
    RoomList {
        region: String,
        rooms: Vec<RoomInfo>,
    },

    // Node -> master
    RegisterNode {
        region: String,
        cipher_key: Vec<u8>,
        address: String,
    },
    UpdateRoom {
        room: RoomInfo,
        remove: bool,
    },

    // Client <-> node
    RoomRequest {
        kind: RoomRequestKind,
        room_id: RoomId,
        token: Vec<u8>,
    },
    RoomResponse {
        kind: RoomRequestKind,
        success: bool,
        room_id: RoomId,
    },
    Chat {
        message: String,
    },
}

impl Packet {
    /// Failed grant for the given request, carrying no node and no token
    pub fn grant_failure(request: RoomRequestKind, room_id: RoomId) -> Self {
        Packet::RoomGrant {
            request,
            success: false,
            room_id,
            node_address: String::new(),
            token: Vec::new(),
        }
    }
}

/// Externally visible projection of a room, as reported by the hosting node
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: RoomId,
    pub name: String,
    pub player_count: u32,
    pub player_max: u32,
    pub state: i32,
}

impl RoomInfo {
    pub fn new(id: RoomId, name: impl Into<String>, player_max: u32) -> Self {
        Self {
            id,
            name: name.into(),
            player_count: 0,
            player_max,
            state: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.player_count >= self.player_max
    }
}
