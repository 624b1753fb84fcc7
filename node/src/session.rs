//! Player connections on a node
//!
//! A player's first and only room request carries the handoff token the
//! master issued. The node opens it with the key it registered and learns the
//! player's user id from it; nothing the player says before that is trusted.

use crate::link::NodeLink;
use crate::lobby::NodeLobby;
use crate::room::Room;
use crate::sync::RoomDirectorySync;
use log::{debug, info, warn};
use shared::transport::{Connection, SessionFlow};
use shared::{Packet, RoomId, RoomRequestKind, UserId};
use std::sync::Arc;

/// Services a player session needs, shared by every session of the node
#[derive(Clone)]
pub struct NodeServices {
    pub lobby: Arc<NodeLobby>,
    pub link: Arc<NodeLink>,
    pub sync: Arc<RoomDirectorySync>,
}

pub struct PlayerSession {
    services: NodeServices,
    connection: Connection,
    user_id: Option<UserId>,
    room: Option<Arc<Room>>,
}

impl PlayerSession {
    pub fn new(services: NodeServices, connection: Connection) -> Self {
        Self {
            services,
            connection,
            user_id: None,
            room: None,
        }
    }

    /// User id taken from the verified token
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn room_id(&self) -> Option<RoomId> {
        self.room.as_ref().map(|room| room.id)
    }

    pub fn handle_packet(&mut self, packet: Packet) -> SessionFlow {
        match packet {
            Packet::RoomRequest {
                kind,
                room_id,
                token,
            } => self.handle_room_request(kind, room_id, &token),
            Packet::Chat { message } => {
                match &self.room {
                    Some(room) => {
                        debug!("Chat in room {}: {}", room.id, message);
                        room.broadcast(&Packet::Chat { message });
                    }
                    None => warn!(
                        "Chat from {} without a room, dropping",
                        self.connection.peer()
                    ),
                }
                SessionFlow::Continue
            }
            other => {
                warn!(
                    "Unexpected packet type from player at {}: {:?}",
                    self.connection.peer(),
                    other
                );
                SessionFlow::Continue
            }
        }
    }

    fn respond(&self, kind: RoomRequestKind, success: bool, room_id: RoomId) {
        self.connection.send(Packet::RoomResponse {
            kind,
            success,
            room_id,
        });
    }

    fn handle_room_request(&mut self, kind: RoomRequestKind, room_id: RoomId, token: &[u8]) -> SessionFlow {
        if self.room.is_some() {
            warn!("User {:?} already in a room", self.user_id);
            self.respond(kind, false, room_id);
            return SessionFlow::Close;
        }

        let capability = match self.services.link.verify(room_id, token) {
            Ok(capability) => capability,
            Err(e) => {
                warn!(
                    "Invalid authentication token from {}: {}",
                    self.connection.peer(),
                    e
                );
                self.respond(kind, false, room_id);
                return SessionFlow::Close;
            }
        };

        let lobby = &self.services.lobby;
        let room = match kind {
            RoomRequestKind::Create => lobby.create_room(room_id),
            RoomRequestKind::Join => lobby.get_room(room_id),
        };
        let Some(room) = room else {
            warn!("Failed to {:?} room {}", kind, room_id);
            self.respond(kind, false, room_id);
            return SessionFlow::Continue;
        };

        let joined = self
            .services
            .sync
            .join(&room, capability.user_id, self.connection.clone());
        if let Err(e) = joined {
            warn!("User {} could not enter: {}", capability.user_id, e);
            if kind == RoomRequestKind::Create {
                lobby.remove_room(&room);
            }
            self.respond(kind, false, room_id);
            return SessionFlow::Continue;
        }

        info!("User {} entered room {}", capability.user_id, room_id);
        self.user_id = Some(capability.user_id);
        self.respond(kind, true, room_id);
        self.room = Some(room);
        SessionFlow::Continue
    }

    /// Leaves the room, removing it once the last player is gone
    pub fn on_disconnect(&mut self) {
        let (Some(room), Some(user_id)) = (self.room.take(), self.user_id) else {
            return;
        };

        let Some(departure) = self.services.sync.leave(&room, user_id) else {
            return;
        };

        if departure.now_empty {
            self.services.lobby.remove_room(&room);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkSettings;
    use shared::handoff::{HandoffCodec, HandoffKey};
    use shared::transport::{self, Outbound, PacketReader};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    struct Harness {
        services: NodeServices,
        codec: HandoffCodec,
        master_reader: PacketReader,
        _master_conn: Connection,
        _listener: TcpListener,
    }

    async fn harness(max_players: u32) -> Harness {
        let listener = transport::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let lobby = Arc::new(NodeLobby::new(max_players));
        let link = Arc::new(NodeLink::new(
            LinkSettings {
                master_address: address,
                region: "EU".to_string(),
                advertised_address: "127.0.0.1:7000".to_string(),
                retry_interval: Duration::from_secs(1),
                token_max_age: None,
            },
            Arc::clone(&lobby),
        ));
        assert!(link.register().await);

        let (stream, _) = listener.accept().await.unwrap();
        let (master_conn, mut master_reader) = transport::split(stream).unwrap();
        let codec = match master_reader.recv().await.unwrap() {
            Some(Packet::RegisterNode { cipher_key, .. }) => {
                HandoffCodec::new(&HandoffKey::from_bytes(&cipher_key).unwrap())
            }
            other => panic!("Expected registration, got {:?}", other),
        };

        let sync = Arc::new(RoomDirectorySync::new(Arc::clone(&link)));
        Harness {
            services: NodeServices { lobby, link, sync },
            codec,
            master_reader,
            _master_conn: master_conn,
            _listener: listener,
        }
    }

    fn player(services: &NodeServices) -> (PlayerSession, UnboundedReceiver<Outbound>) {
        let (connection, rx) = Connection::queue("127.0.0.1:60000".parse().unwrap());
        (PlayerSession::new(services.clone(), connection), rx)
    }

    fn response(rx: &mut UnboundedReceiver<Outbound>) -> (RoomRequestKind, bool, RoomId) {
        match rx.try_recv() {
            Ok(Outbound::Packet(Packet::RoomResponse {
                kind,
                success,
                room_id,
            })) => (kind, success, room_id),
            other => panic!("Expected room response, got {:?}", other),
        }
    }

    async fn next_update(reader: &mut PacketReader) -> (RoomId, u32, bool) {
        match timeout(Duration::from_secs(2), reader.recv()).await.unwrap().unwrap() {
            Some(Packet::UpdateRoom { room, remove }) => (room.id, room.player_count, remove),
            other => panic!("Expected room update, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_with_valid_token() {
        let mut h = harness(4).await;
        let (mut session, mut rx) = player(&h.services);
        let token = h.codec.issue(21, 500).unwrap();

        let flow = session.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Create,
            room_id: 500,
            token,
        });

        assert_eq!(flow, SessionFlow::Continue);
        assert_eq!(response(&mut rx), (RoomRequestKind::Create, true, 500));
        assert_eq!(session.user_id(), Some(21));
        assert_eq!(session.room_id(), Some(500));
        assert_eq!(next_update(&mut h.master_reader).await, (500, 1, false));
    }

    #[tokio::test]
    async fn test_token_under_other_key_closes() {
        let h = harness(4).await;
        let (mut session, mut rx) = player(&h.services);
        let stranger = HandoffCodec::new(&HandoffKey::generate().unwrap());

        let flow = session.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Create,
            room_id: 1,
            token: stranger.issue(3, 1).unwrap(),
        });

        assert_eq!(flow, SessionFlow::Close);
        assert_eq!(response(&mut rx), (RoomRequestKind::Create, false, 1));
        assert!(session.user_id().is_none());
        assert!(h.services.lobby.is_empty());
    }

    #[tokio::test]
    async fn test_token_for_other_room_closes() {
        let h = harness(4).await;
        let (mut session, mut rx) = player(&h.services);

        let flow = session.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Join,
            room_id: 2,
            token: h.codec.issue(3, 1).unwrap(),
        });

        assert_eq!(flow, SessionFlow::Close);
        assert_eq!(response(&mut rx), (RoomRequestKind::Join, false, 2));
    }

    #[tokio::test]
    async fn test_join_missing_room_keeps_connection() {
        let h = harness(4).await;
        let (mut session, mut rx) = player(&h.services);

        let flow = session.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Join,
            room_id: 8,
            token: h.codec.issue(3, 8).unwrap(),
        });

        assert_eq!(flow, SessionFlow::Continue);
        assert_eq!(response(&mut rx), (RoomRequestKind::Join, false, 8));
    }

    #[tokio::test]
    async fn test_second_request_closes() {
        let h = harness(4).await;
        let (mut session, mut rx) = player(&h.services);

        session.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Create,
            room_id: 9,
            token: h.codec.issue(1, 9).unwrap(),
        });
        response(&mut rx);

        let flow = session.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Join,
            room_id: 9,
            token: h.codec.issue(1, 9).unwrap(),
        });
        assert_eq!(flow, SessionFlow::Close);
        assert_eq!(response(&mut rx), (RoomRequestKind::Join, false, 9));
    }

    #[tokio::test]
    async fn test_join_full_room_fails() {
        let h = harness(1).await;
        let (mut owner, mut owner_rx) = player(&h.services);
        let (mut late, mut late_rx) = player(&h.services);

        owner.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Create,
            room_id: 4,
            token: h.codec.issue(1, 4).unwrap(),
        });
        assert!(response(&mut owner_rx).1);

        let flow = late.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Join,
            room_id: 4,
            token: h.codec.issue(2, 4).unwrap(),
        });
        assert_eq!(flow, SessionFlow::Continue);
        assert!(!response(&mut late_rx).1);
    }

    #[tokio::test]
    async fn test_chat_relayed_to_room() {
        let h = harness(4).await;
        let (mut a, mut a_rx) = player(&h.services);
        let (mut b, mut b_rx) = player(&h.services);

        a.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Create,
            room_id: 30,
            token: h.codec.issue(1, 30).unwrap(),
        });
        b.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Join,
            room_id: 30,
            token: h.codec.issue(2, 30).unwrap(),
        });
        response(&mut a_rx);
        response(&mut b_rx);

        a.handle_packet(Packet::Chat {
            message: "gg".to_string(),
        });
        for rx in [&mut a_rx, &mut b_rx] {
            assert!(matches!(
                rx.try_recv(),
                Ok(Outbound::Packet(Packet::Chat { .. }))
            ));
        }
    }

    #[tokio::test]
    async fn test_last_player_leaving_removes_room() {
        let mut h = harness(4).await;
        let (mut a, _a_rx) = player(&h.services);
        let (mut b, _b_rx) = player(&h.services);

        a.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Create,
            room_id: 70,
            token: h.codec.issue(1, 70).unwrap(),
        });
        b.handle_packet(Packet::RoomRequest {
            kind: RoomRequestKind::Join,
            room_id: 70,
            token: h.codec.issue(2, 70).unwrap(),
        });
        assert_eq!(next_update(&mut h.master_reader).await, (70, 1, false));
        assert_eq!(next_update(&mut h.master_reader).await, (70, 2, false));

        b.on_disconnect();
        assert_eq!(next_update(&mut h.master_reader).await, (70, 1, false));
        assert!(h.services.lobby.get_room(70).is_some());

        a.on_disconnect();
        assert_eq!(next_update(&mut h.master_reader).await, (70, 0, true));
        assert!(h.services.lobby.get_room(70).is_none());
    }
}
