//! Game client connections on the master
//!
//! A client has to say `Hello` with the right version key before anything
//! else. After that it may create rooms, join rooms and list rooms; each grant
//! carries a handoff token sealed for the node that will host the client.

use crate::cluster::NodeDescriptor;
use crate::state::MasterState;
use log::{debug, error, info, warn};
use shared::transport::{Connection, SessionFlow};
use shared::{Packet, RoomId, RoomRequestKind, UserId};
use std::sync::Arc;

pub struct ClientSession {
    state: Arc<MasterState>,
    connection: Connection,
    user_id: Option<UserId>,
}

impl ClientSession {
    pub fn new(state: Arc<MasterState>, connection: Connection) -> Self {
        Self {
            state,
            connection,
            user_id: None,
        }
    }

    /// The master assigned id, once the client has said hello
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn handle_packet(&mut self, packet: Packet) -> SessionFlow {
        if let Packet::Hello { version_key } = packet {
            return self.handle_hello(&version_key);
        }

        let Some(user_id) = self.user_id else {
            warn!(
                "Client {} sent a request before hello, disconnecting",
                self.connection.peer()
            );
            return SessionFlow::Close;
        };

        match packet {
            Packet::CreateRoom { region } => self.handle_create_room(user_id, &region),
            Packet::JoinRoom { room_id } => self.handle_join_room(user_id, room_id),
            Packet::ListRooms { region } => self.handle_list_rooms(&region),
            other => warn!(
                "Unexpected packet type from client {}: {:?}",
                user_id, other
            ),
        }
        SessionFlow::Continue
    }

    fn handle_hello(&mut self, version_key: &str) -> SessionFlow {
        if version_key != self.state.version_key {
            warn!(
                "Client {} presented version key {:?}, disconnecting",
                self.connection.peer(),
                version_key
            );
            return SessionFlow::Close;
        }

        let user_id = match self.user_id {
            Some(user_id) => user_id,
            None => {
                let user_id = self.state.next_user_id();
                self.state.lobby.set_user(user_id, self.connection.clone());
                self.user_id = Some(user_id);
                info!("Client {} connected from {}", user_id, self.connection.peer());
                user_id
            }
        };

        self.connection.send(Packet::Welcome { user_id });
        SessionFlow::Continue
    }

    fn handle_create_room(&self, user_id: UserId, region: &str) {
        let room_id = self.state.room_ids.next_id();
        self.grant_new_room(user_id, room_id, region);
    }

    fn grant_new_room(&self, user_id: UserId, room_id: RoomId, region: &str) {
        let request = RoomRequestKind::Create;

        if self.state.lobby.has_room(room_id) {
            error!("Generated room id {} is already in use", room_id);
            self.connection.send(Packet::grant_failure(request, room_id));
            return;
        }

        let Some(node) = self.state.cluster.best_for_region(region) else {
            warn!("No nodes found for region {}", region);
            self.connection.send(Packet::grant_failure(request, room_id));
            return;
        };

        self.send_grant(request, user_id, room_id, &node);
    }

    fn handle_join_room(&self, user_id: UserId, room_id: RoomId) {
        let request = RoomRequestKind::Join;

        let Some(entry) = self.state.lobby.get_room(room_id) else {
            debug!("Client {} asked for unknown room {}", user_id, room_id);
            self.connection.send(Packet::grant_failure(request, room_id));
            return;
        };

        let Some(node) = entry.node() else {
            error!("Node hosting room {} is gone", room_id);
            self.connection.send(Packet::grant_failure(request, room_id));
            return;
        };

        if entry.info().is_full() {
            debug!("Room {} is full, refusing client {}", room_id, user_id);
            self.connection.send(Packet::grant_failure(request, room_id));
            return;
        }

        self.send_grant(request, user_id, room_id, &node);
    }

    fn send_grant(
        &self,
        request: RoomRequestKind,
        user_id: UserId,
        room_id: RoomId,
        node: &NodeDescriptor,
    ) {
        match node.issue_token(user_id, room_id) {
            Ok(token) => {
                debug!(
                    "Granting {:?} of room {} on node {} to client {}",
                    request, room_id, node.id, user_id
                );
                self.connection.send(Packet::RoomGrant {
                    request,
                    success: true,
                    room_id,
                    node_address: node.address.clone(),
                    token,
                });
            }
            Err(e) => {
                error!("Failed to issue handoff token for room {}: {}", room_id, e);
                self.connection.send(Packet::grant_failure(request, room_id));
            }
        }
    }

    fn handle_list_rooms(&self, region: &str) {
        let rooms = self.state.lobby.rooms_in_region(region);
        self.connection.send(Packet::RoomList {
            region: region.to_string(),
            rooms,
        });
    }

    /// Drops the user from the registry. Safe to call more than once.
    pub fn on_disconnect(&mut self) {
        if let Some(user_id) = self.user_id.take() {
            self.state.lobby.remove_user(user_id);
            debug!("Client {} disconnected", user_id);
        }
    }
}
