//! Pushes room lifecycle changes to the master's room directory
//!
//! Every change sends the full room projection; the master replaces its entry
//! wholesale. Changes made while the node is not registered are dropped, the
//! next registration re-announces whatever rooms still exist.
//!
//! Membership changes go through here so that each update is queued while
//! the room is still locked. Two players leaving at once therefore reach the
//! master as `player_count` N-1 followed by the removal, never the reverse.

use crate::link::NodeLink;
use crate::room::{Departure, Room, RoomError};
use log::debug;
use shared::transport::Connection;
use shared::{Packet, RoomInfo, UserId};
use std::sync::Arc;

pub struct RoomDirectorySync {
    link: Arc<NodeLink>,
}

impl RoomDirectorySync {
    pub fn new(link: Arc<NodeLink>) -> Self {
        Self { link }
    }

    /// Adds `user_id` to `room` and reports the room's new state
    pub fn join(
        &self,
        room: &Room,
        user_id: UserId,
        connection: Connection,
    ) -> Result<RoomInfo, RoomError> {
        self.link.with_master(|master| {
            room.add_user_then(user_id, connection, |info| {
                push(master, info.clone(), false);
            })
        })
    }

    /// Removes `user_id` from `room`; the last departure removes the room upstream
    pub fn leave(&self, room: &Room, user_id: UserId) -> Option<Departure> {
        self.link.with_master(|master| {
            room.remove_user_then(user_id, |departure| {
                push(master, departure.info.clone(), departure.now_empty);
            })
        })
    }
}

fn push(master: Option<&Connection>, room: RoomInfo, remove: bool) -> bool {
    let id = room.id;
    let sent = master.map_or(false, |master| {
        master.send(Packet::UpdateRoom { room, remove })
    });
    if !sent {
        debug!("Not registered with master, dropping update for room {}", id);
    }
    sent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkSettings;
    use crate::lobby::NodeLobby;
    use shared::transport::{self, PacketReader};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn link(master_address: String, lobby: Arc<NodeLobby>) -> Arc<NodeLink> {
        Arc::new(NodeLink::new(
            LinkSettings {
                master_address,
                region: "EU".to_string(),
                advertised_address: "127.0.0.1:7000".to_string(),
                retry_interval: Duration::from_secs(1),
                token_max_age: None,
            },
            lobby,
        ))
    }

    fn member() -> Connection {
        Connection::queue("127.0.0.1:2".parse().unwrap()).0
    }

    async fn registered() -> (Arc<NodeLobby>, Arc<NodeLink>, PacketReader, Connection, TcpListener) {
        let listener = transport::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let lobby = Arc::new(NodeLobby::new(4));
        let link = link(address, Arc::clone(&lobby));

        assert!(link.register().await);
        let (stream, _) = listener.accept().await.unwrap();
        let (conn, mut reader) = transport::split(stream).unwrap();
        assert!(matches!(
            reader.recv().await.unwrap(),
            Some(Packet::RegisterNode { .. })
        ));
        (lobby, link, reader, conn, listener)
    }

    async fn updates(reader: &mut PacketReader, count: usize) -> Vec<(u64, u32, bool)> {
        let mut received = Vec::new();
        for _ in 0..count {
            match timeout(Duration::from_secs(2), reader.recv()).await.unwrap().unwrap() {
                Some(Packet::UpdateRoom { room, remove }) => {
                    received.push((room.id, room.player_count, remove))
                }
                other => panic!("Unexpected packet {:?}", other),
            }
        }
        received
    }

    #[tokio::test]
    async fn test_updates_dropped_while_unregistered() {
        let lobby = Arc::new(NodeLobby::new(4));
        let sync = RoomDirectorySync::new(link("127.0.0.1:1".to_string(), Arc::clone(&lobby)));
        let room = lobby.create_room(3).unwrap();

        assert_eq!(sync.join(&room, 1, member()).unwrap().player_count, 1);
        assert!(sync.leave(&room, 1).unwrap().now_empty);
    }

    #[tokio::test]
    async fn test_lifecycle_updates_reach_master() {
        let (lobby, link, mut reader, _conn, _listener) = registered().await;
        let sync = RoomDirectorySync::new(Arc::clone(&link));

        let room = lobby.create_room(12).unwrap();
        sync.join(&room, 1, member()).unwrap();
        sync.leave(&room, 1).unwrap();

        assert_eq!(updates(&mut reader, 2).await, vec![(12, 1, false), (12, 0, true)]);
        link.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_departures_end_with_removal() {
        let (lobby, link, mut reader, _conn, _listener) = registered().await;
        let sync = Arc::new(RoomDirectorySync::new(Arc::clone(&link)));

        let room = lobby.create_room(12).unwrap();
        for user_id in 1..=4 {
            sync.join(&room, user_id, member()).unwrap();
        }
        assert_eq!(updates(&mut reader, 4).await.last(), Some(&(12, 4, false)));

        let leavers: Vec<_> = (1..=4)
            .map(|user_id| {
                let sync = Arc::clone(&sync);
                let room = Arc::clone(&room);
                std::thread::spawn(move || sync.leave(&room, user_id).unwrap())
            })
            .collect();
        let emptied = leavers
            .into_iter()
            .map(|leaver| leaver.join().unwrap())
            .filter(|departure| departure.now_empty)
            .count();
        assert_eq!(emptied, 1);
        assert!(lobby.remove_room(&room));

        let received = updates(&mut reader, 4).await;
        assert_eq!(
            received,
            vec![(12, 3, false), (12, 2, false), (12, 1, false), (12, 0, true)]
        );

        link.stop().await;
    }

    #[tokio::test]
    async fn test_closed_room_reports_nothing_more() {
        let (lobby, link, mut reader, _conn, _listener) = registered().await;
        let sync = RoomDirectorySync::new(Arc::clone(&link));

        let room = lobby.create_room(12).unwrap();
        sync.join(&room, 1, member()).unwrap();
        sync.join(&room, 2, member()).unwrap();
        sync.leave(&room, 2).unwrap();
        sync.leave(&room, 1).unwrap();
        assert!(lobby.remove_room(&room));

        // Late arrivals for the destroyed room change nothing upstream
        assert!(sync.leave(&room, 1).is_none());
        assert_eq!(sync.join(&room, 3, member()), Err(RoomError::Closed(12)));
        link.stop().await;

        assert_eq!(
            updates(&mut reader, 4).await,
            vec![(12, 1, false), (12, 2, false), (12, 1, false), (12, 0, true)]
        );
        let tail = timeout(Duration::from_secs(2), reader.recv()).await.unwrap();
        assert!(matches!(tail, Ok(None)));
    }
}
