//! Master network layer: one listener for game clients, one for game nodes

use crate::client_session::ClientSession;
use crate::config::MasterConfig;
use crate::node_session::NodeSession;
use crate::state::MasterState;
use log::{debug, info, warn};
use shared::transport::{self, TransportError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Master server with both listeners bound
pub struct MasterServer {
    state: Arc<MasterState>,
    client_listener: TcpListener,
    cluster_listener: TcpListener,
    name: String,
}

impl MasterServer {
    pub async fn bind(config: &MasterConfig) -> Result<Self, TransportError> {
        let client_listener = transport::bind(&config.client_address).await?;
        let cluster_listener = transport::bind(&config.cluster_address).await?;

        Ok(Self {
            state: Arc::new(MasterState::new(config.version_key.clone())),
            client_listener,
            cluster_listener,
            name: config.name.clone(),
        })
    }

    pub fn state(&self) -> Arc<MasterState> {
        Arc::clone(&self.state)
    }

    pub fn client_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.client_listener.local_addr()?)
    }

    pub fn cluster_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.cluster_listener.local_addr()?)
    }

    /// Accepts clients and nodes until the returned future is dropped
    ///
    /// Only reading the bound addresses can fail; accept errors are retried.
    pub async fn run(self) -> Result<(), TransportError> {
        info!(
            "{} listening for clients on {} and nodes on {}",
            self.name,
            self.client_addr()?,
            self.cluster_addr()?
        );

        let clients = accept_clients(self.client_listener, Arc::clone(&self.state));
        let nodes = accept_nodes(self.cluster_listener, Arc::clone(&self.state));

        tokio::join!(clients, nodes);
        Ok(())
    }
}

async fn accept_clients(listener: TcpListener, state: Arc<MasterState>) {
    loop {
        let (stream, addr) = transport::accept(&listener).await;
        debug!("Client connection from {}", addr);

        let (connection, reader) = match transport::split(stream) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Failed to set up client connection from {}: {}", addr, e);
                continue;
            }
        };

        let session = ClientSession::new(Arc::clone(&state), connection.clone());
        tokio::spawn(async move {
            let mut session = session;
            reader.drive(|packet| session.handle_packet(packet)).await;
            session.on_disconnect();
            connection.close();
        });
    }
}

async fn accept_nodes(listener: TcpListener, state: Arc<MasterState>) {
    loop {
        let (stream, addr) = transport::accept(&listener).await;
        info!("Node connection from {}", addr);

        let (connection, reader) = match transport::split(stream) {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Failed to set up node connection from {}: {}", addr, e);
                continue;
            }
        };

        let session = NodeSession::new(Arc::clone(&state), connection.clone());
        tokio::spawn(async move {
            let mut session = session;
            reader.drive(|packet| session.handle_packet(packet)).await;
            session.on_disconnect();
            connection.close();
        });
    }
}
