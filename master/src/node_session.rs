//! Game node connections on the master
//!
//! A node joins the cluster with `RegisterNode` and then keeps the room
//! directory current with `UpdateRoom`. When the connection drops, the node
//! and every room it hosted disappear from the master.

use crate::cluster::{NodeDescriptor, NodeRegistration};
use crate::lobby::RoomUpdate;
use crate::state::MasterState;
use log::{debug, info, warn};
use shared::handoff::HandoffKey;
use shared::transport::{Connection, SessionFlow};
use shared::{Packet, RoomInfo};
use std::sync::Arc;

pub struct NodeSession {
    state: Arc<MasterState>,
    connection: Connection,
    node: Option<Arc<NodeDescriptor>>,
}

impl NodeSession {
    pub fn new(state: Arc<MasterState>, connection: Connection) -> Self {
        Self {
            state,
            connection,
            node: None,
        }
    }

    pub fn node(&self) -> Option<&Arc<NodeDescriptor>> {
        self.node.as_ref()
    }

    pub fn handle_packet(&mut self, packet: Packet) -> SessionFlow {
        match packet {
            Packet::RegisterNode {
                region,
                cipher_key,
                address,
            } => self.handle_register(region, &cipher_key, address),
            Packet::UpdateRoom { room, remove } => {
                self.handle_update_room(&room, remove);
                SessionFlow::Continue
            }
            other => {
                warn!(
                    "Unexpected packet type from node at {}: {:?}",
                    self.connection.peer(),
                    other
                );
                SessionFlow::Continue
            }
        }
    }

    fn handle_register(&mut self, region: String, cipher_key: &[u8], address: String) -> SessionFlow {
        if let Some(node) = &self.node {
            warn!("Node {} sent a second registration, ignoring", node.id);
            return SessionFlow::Continue;
        }

        let cipher_key = match HandoffKey::from_bytes(cipher_key) {
            Ok(key) => key,
            Err(e) => {
                warn!(
                    "Rejecting node registration from {}: {}",
                    self.connection.peer(),
                    e
                );
                return SessionFlow::Close;
            }
        };

        let node = self.state.cluster.add(NodeRegistration {
            region,
            address,
            cipher_key,
        });
        info!(
            "Node {} serving at {} for region {}",
            node.id, node.address, node.region
        );
        self.node = Some(node);
        SessionFlow::Continue
    }

    fn handle_update_room(&self, room: &RoomInfo, remove: bool) {
        let Some(node) = &self.node else {
            warn!(
                "Dropping room update from unregistered node at {}",
                self.connection.peer()
            );
            return;
        };

        match self.state.lobby.apply_update(node, room, remove) {
            RoomUpdate::Rejected | RoomUpdate::Unknown => {}
            update => debug!("Room {} from node {}: {:?}", room.id, node.id, update),
        }
    }

    /// Removes the node from the cluster and purges its rooms
    pub fn on_disconnect(&mut self) {
        let Some(node) = self.node.take() else {
            return;
        };

        self.state.cluster.remove(node.id);
        let purged = self.state.lobby.remove_rooms_from_node(node.id);
        info!("Node {} disconnected, {} rooms removed", node.id, purged);
    }
}
