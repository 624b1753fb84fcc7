//! Client connections to the master and to a game node

use crate::error::ClientError;
use log::{debug, info};
use shared::transport::{self, Connection, PacketReader};
use shared::{Packet, RoomId, RoomInfo, RoomRequestKind, UserId};
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A successful placement: where to go and what to show the node
#[derive(Debug, Clone)]
pub struct RoomGrant {
    pub request: RoomRequestKind,
    pub room_id: RoomId,
    pub node_address: String,
    pub token: Vec<u8>,
}

/// Waits for the first packet `pick` accepts, skipping anything else
async fn expect<T, F>(
    reader: &mut PacketReader,
    wait: Duration,
    what: &'static str,
    mut pick: F,
) -> Result<T, ClientError>
where
    F: FnMut(Packet) -> Option<T>,
{
    let receive = async {
        loop {
            match reader.recv().await? {
                Some(packet) => {
                    if let Some(value) = pick(packet) {
                        return Ok(value);
                    }
                }
                None => return Err(ClientError::Disconnected),
            }
        }
    };

    timeout(wait, receive)
        .await
        .map_err(|_| ClientError::Timeout(what))?
}

pub struct MasterClient {
    connection: Connection,
    reader: PacketReader,
    user_id: UserId,
    timeout: Duration,
}

impl MasterClient {
    /// Connects and authenticates with `version_key`
    pub async fn connect(address: &str, version_key: &str) -> Result<Self, ClientError> {
        Self::connect_with_timeout(address, version_key, DEFAULT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(
        address: &str,
        version_key: &str,
        wait: Duration,
    ) -> Result<Self, ClientError> {
        let (connection, mut reader) = transport::connect(address).await?;
        connection.send(Packet::Hello {
            version_key: version_key.to_string(),
        });

        let user_id = expect(&mut reader, wait, "welcome", |packet| match packet {
            Packet::Welcome { user_id } => Some(user_id),
            _ => None,
        })
        .await?;
        info!("Connected to master as user {}", user_id);

        Ok(Self {
            connection,
            reader,
            user_id,
            timeout: wait,
        })
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub async fn create_room(&mut self, region: &str) -> Result<RoomGrant, ClientError> {
        self.connection.send(Packet::CreateRoom {
            region: region.to_string(),
        });
        self.await_grant(RoomRequestKind::Create).await
    }

    pub async fn join_room(&mut self, room_id: RoomId) -> Result<RoomGrant, ClientError> {
        self.connection.send(Packet::JoinRoom { room_id });
        self.await_grant(RoomRequestKind::Join).await
    }

    pub async fn list_rooms(&mut self, region: &str) -> Result<Vec<RoomInfo>, ClientError> {
        self.connection.send(Packet::ListRooms {
            region: region.to_string(),
        });
        expect(&mut self.reader, self.timeout, "room list", |packet| match packet {
            Packet::RoomList { rooms, .. } => Some(rooms),
            _ => None,
        })
        .await
    }

    async fn await_grant(&mut self, expected: RoomRequestKind) -> Result<RoomGrant, ClientError> {
        let grant = expect(&mut self.reader, self.timeout, "room grant", |packet| match packet {
            Packet::RoomGrant {
                request,
                success,
                room_id,
                node_address,
                token,
            } if request == expected => Some((success, room_id, node_address, token)),
            _ => None,
        })
        .await?;

        let (success, room_id, node_address, token) = grant;
        if !success {
            return Err(ClientError::GrantRefused {
                request: expected,
                room_id,
            });
        }

        debug!("Granted room {} on {}", room_id, node_address);
        Ok(RoomGrant {
            request: expected,
            room_id,
            node_address,
            token,
        })
    }

    pub fn close(self) {
        self.connection.close();
    }
}

/// A player's connection to the node hosting its room
pub struct RoomClient {
    connection: Connection,
    reader: PacketReader,
    room_id: RoomId,
    timeout: Duration,
}

impl RoomClient {
    /// Connects to the granted node and presents the token
    pub async fn enter(grant: &RoomGrant) -> Result<Self, ClientError> {
        Self::enter_with_timeout(grant, DEFAULT_TIMEOUT).await
    }

    pub async fn enter_with_timeout(grant: &RoomGrant, wait: Duration) -> Result<Self, ClientError> {
        let (connection, mut reader) = transport::connect(&grant.node_address).await?;
        connection.send(Packet::RoomRequest {
            kind: grant.request,
            room_id: grant.room_id,
            token: grant.token.clone(),
        });

        let success = expect(&mut reader, wait, "room response", |packet| match packet {
            Packet::RoomResponse {
                kind,
                success,
                room_id,
            } if kind == grant.request && room_id == grant.room_id => Some(success),
            _ => None,
        })
        .await?;

        if !success {
            return Err(ClientError::RoomRefused {
                request: grant.request,
                room_id: grant.room_id,
            });
        }

        info!("Entered room {} on {}", grant.room_id, grant.node_address);
        Ok(Self {
            connection,
            reader,
            room_id: grant.room_id,
            timeout: wait,
        })
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    pub fn chat(&self, message: &str) -> bool {
        self.connection.send(Packet::Chat {
            message: message.to_string(),
        })
    }

    /// Next chat line relayed by the room
    pub async fn next_chat(&mut self) -> Result<String, ClientError> {
        expect(&mut self.reader, self.timeout, "chat", |packet| match packet {
            Packet::Chat { message } => Some(message),
            _ => None,
        })
        .await
    }

    /// Next packet from the node, without a deadline
    pub async fn recv(&mut self) -> Result<Option<Packet>, ClientError> {
        Ok(self.reader.recv().await?)
    }

    pub fn leave(self) {
        self.connection.close();
    }
}
