//! Node network layer: the player listener and the services behind it

use crate::address::advertised_address;
use crate::config::NodeConfig;
use crate::link::{LinkSettings, NodeLink};
use crate::lobby::NodeLobby;
use crate::session::{NodeServices, PlayerSession};
use crate::sync::RoomDirectorySync;
use log::{debug, info, warn};
use shared::transport::{self, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct NodeServer {
    listener: TcpListener,
    services: NodeServices,
    name: String,
}

impl NodeServer {
    /// Binds the player listener and wires up the link for the bound port
    pub async fn bind(config: &NodeConfig) -> Result<Self, TransportError> {
        let listener = transport::bind(&config.address).await?;
        let port = listener.local_addr()?.port();

        let lobby = Arc::new(NodeLobby::new(config.max_players));
        let link = Arc::new(NodeLink::new(
            LinkSettings {
                master_address: config.master_address.clone(),
                region: config.region.clone(),
                advertised_address: advertised_address(config.public_host.as_deref(), port),
                retry_interval: config.retry_interval(),
                token_max_age: config.token_max_age(),
            },
            Arc::clone(&lobby),
        ));
        let sync = Arc::new(RoomDirectorySync::new(Arc::clone(&link)));

        Ok(Self {
            listener,
            services: NodeServices { lobby, link, sync },
            name: config.name.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn link(&self) -> Arc<NodeLink> {
        Arc::clone(&self.services.link)
    }

    pub fn lobby(&self) -> Arc<NodeLobby> {
        Arc::clone(&self.services.lobby)
    }

    /// Accepts players until the returned future is dropped
    ///
    /// Only reading the bound address can fail; accept errors are retried.
    pub async fn run(self) -> Result<(), TransportError> {
        info!(
            "{} serving players on {} (announced as {})",
            self.name,
            self.local_addr()?,
            self.services.link.settings().advertised_address
        );

        loop {
            let (stream, addr) = transport::accept(&self.listener).await;
            debug!("Player connection from {}", addr);

            let (connection, reader) = match transport::split(stream) {
                Ok(parts) => parts,
                Err(e) => {
                    warn!("Failed to set up player connection from {}: {}", addr, e);
                    continue;
                }
            };

            let mut session = PlayerSession::new(self.services.clone(), connection.clone());
            tokio::spawn(async move {
                reader.drive(|packet| session.handle_packet(packet)).await;
                session.on_disconnect();
                connection.close();
            });
        }
    }
}
