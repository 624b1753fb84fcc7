//! # Master Server Library
//!
//! The master is the single directory and authority of the room cluster.
//! Clients authenticate against it once, ask it for a room, and get back the
//! address of a game node together with a handoff token. The node accepts the
//! token on its own, without calling back.
//!
//! ## Core Responsibilities
//!
//! ### Room Directory
//! Keeps the externally visible state of every room in the cluster. Nodes push
//! a full projection of a room whenever it changes; the master never simulates
//! anything itself.
//!
//! ### Cluster Membership
//! Tracks the connected nodes, their region and how many rooms they host, and
//! places new rooms on the least loaded node of the requested region.
//!
//! ### Handoff Tokens
//! Every grant carries a capability sealed with the key the target node sent at
//! registration. Only that node can open it, and only for the granted room.
//!
//! ## Module Organization
//!
//! ### Sharded Map (`sharded_map`)
//! Generic concurrent map split into independently locked shards. Used for the
//! room directory and the user registry.
//!
//! ### Lobby (`lobby`)
//! Room directory and connected user registry, including how node updates are
//! applied and how a departed node's rooms are purged.
//!
//! ### Cluster (`cluster`)
//! Node registry and region based placement.
//!
//! ### Sessions (`client_session`, `node_session`)
//! Per connection packet handlers. The listener a connection arrived on decides
//! which kind of session it gets.
//!
//! ### Network (`network`)
//! Listeners, accept loops and the per connection read loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use master::config::MasterConfig;
//! use master::network::MasterServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = MasterServer::bind(&MasterConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client_session;
pub mod cluster;
pub mod config;
pub mod id_gen;
pub mod lobby;
pub mod network;
pub mod node_session;
pub mod sharded_map;
pub mod state;
