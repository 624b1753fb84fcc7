//! A hosted room: a set of members and a chat relay

use log::debug;
use parking_lot::Mutex;
use shared::transport::Connection;
use shared::{Packet, RoomId, RoomInfo, UserId};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoomError {
    #[error("room {0} is full")]
    Full(RoomId),
    #[error("room {0} is closing")]
    Closed(RoomId),
    #[error("user {user_id} is already in room {room_id}")]
    AlreadyMember { room_id: RoomId, user_id: UserId },
}

/// Result of a member leaving
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub info: RoomInfo,
    /// The last member left; the room no longer accepts anyone
    pub now_empty: bool,
}

struct RoomInner {
    members: HashMap<UserId, Connection>,
    state: i32,
    closed: bool,
}

pub struct Room {
    pub id: RoomId,
    pub name: String,
    player_max: u32,
    inner: Mutex<RoomInner>,
}

impl Room {
    pub fn new(id: RoomId, player_max: u32) -> Self {
        Self {
            id,
            name: format!("Room {}", id),
            player_max,
            inner: Mutex::new(RoomInner {
                members: HashMap::new(),
                state: 0,
                closed: false,
            }),
        }
    }

    pub fn info(&self) -> RoomInfo {
        let inner = self.inner.lock();
        self.info_locked(&inner)
    }

    fn info_locked(&self, inner: &RoomInner) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.name.clone(),
            player_count: inner.members.len() as u32,
            player_max: self.player_max,
            state: inner.state,
        }
    }

    pub fn add_user(&self, user_id: UserId, connection: Connection) -> Result<RoomInfo, RoomError> {
        self.add_user_then(user_id, connection, |_| {})
    }

    /// Adds a member and hands the new projection to `report` before the room
    /// is unlocked, so reports leave in the order the changes happened
    pub fn add_user_then<F>(
        &self,
        user_id: UserId,
        connection: Connection,
        report: F,
    ) -> Result<RoomInfo, RoomError>
    where
        F: FnOnce(&RoomInfo),
    {
        let mut inner = self.inner.lock();

        if inner.closed {
            return Err(RoomError::Closed(self.id));
        }
        if inner.members.contains_key(&user_id) {
            return Err(RoomError::AlreadyMember {
                room_id: self.id,
                user_id,
            });
        }
        if inner.members.len() as u32 >= self.player_max {
            return Err(RoomError::Full(self.id));
        }

        inner.members.insert(user_id, connection);
        debug!("User {} joined room {}", user_id, self.id);
        let info = self.info_locked(&inner);
        report(&info);
        Ok(info)
    }

    /// Removes a member. Returns `None` if the user was not in the room.
    pub fn remove_user(&self, user_id: UserId) -> Option<Departure> {
        self.remove_user_then(user_id, |_| {})
    }

    /// Removes a member, reporting the departure under the room's lock
    pub fn remove_user_then<F>(&self, user_id: UserId, report: F) -> Option<Departure>
    where
        F: FnOnce(&Departure),
    {
        let mut inner = self.inner.lock();
        inner.members.remove(&user_id)?;
        debug!("User {} left room {}", user_id, self.id);

        let now_empty = inner.members.is_empty();
        if now_empty {
            inner.closed = true;
        }
        let departure = Departure {
            info: self.info_locked(&inner),
            now_empty,
        };
        report(&departure);
        Some(departure)
    }

    /// Projection to re-announce after registration
    ///
    /// Closed rooms are gone from the master's point of view, and a room
    /// without members is still being created by its first player.
    pub fn announcement(&self) -> Option<RoomInfo> {
        let inner = self.inner.lock();
        if inner.closed || inner.members.is_empty() {
            return None;
        }
        Some(self.info_locked(&inner))
    }

    pub fn player_count(&self) -> usize {
        self.inner.lock().members.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Sends `packet` to every member. Returns how many were reached.
    pub fn broadcast(&self, packet: &Packet) -> usize {
        let members: Vec<Connection> = self.inner.lock().members.values().cloned().collect();
        members
            .iter()
            .filter(|connection| connection.send(packet.clone()))
            .count()
    }
}
