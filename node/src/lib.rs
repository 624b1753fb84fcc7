//! # Game Node Library
//!
//! A node hosts rooms for players the master sent its way. It registers with
//! the master on start, tells it where players can reach it and which key to
//! seal handoff tokens with, and reports every room change back.
//!
//! ## Handoff
//! A player arrives with `{room_id, token}`. The node opens the token with its
//! current key and admits the player only if the token was issued for that
//! room. There is no round trip to the master.
//!
//! ## Modules
//! - `link`: registration, key exchange and the retry loop
//! - `sync`: room updates pushed to the master
//! - `lobby` and `room`: the rooms hosted here
//! - `session`: one player connection
//! - `address`: which address to announce
//! - `network`: the player listener

pub mod address;
pub mod config;
pub mod link;
pub mod lobby;
pub mod network;
pub mod room;
pub mod session;
pub mod sync;
