//! # Room Client Library
//!
//! Headless client for the room cluster. A player session has two legs:
//!
//! 1. **Master**: connect, say `Hello` with the shared version key, then ask
//!    to create or join a room. The master answers with a grant naming the
//!    node that hosts the room and a sealed token.
//! 2. **Node**: connect to the granted address, present the token, and from
//!    then on exchange room traffic (chat) with the other members.
//!
//! The node never calls back to the master while admitting a player; the
//! token alone proves the grant.
//!
//! ## Modules
//! - `network`: `MasterClient`, `RoomClient` and the `RoomGrant` passed between them
//! - `error`: `ClientError`

pub mod error;
pub mod network;

pub use error::ClientError;
pub use network::{MasterClient, RoomClient, RoomGrant};
