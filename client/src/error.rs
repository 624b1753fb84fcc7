use shared::transport::TransportError;
use shared::{RoomId, RoomRequestKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("connection closed by peer")]
    Disconnected,
    #[error("master refused to {request:?} room {room_id}")]
    GrantRefused {
        request: RoomRequestKind,
        room_id: RoomId,
    },
    #[error("node refused to {request:?} room {room_id}")]
    RoomRefused {
        request: RoomRequestKind,
        room_id: RoomId,
    },
}
