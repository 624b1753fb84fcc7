//! Framed TCP transport shared by the master, the nodes and the client
//!
//! Every frame is a big-endian `u32` payload length followed by a bincode
//! encoded [`Packet`]. Each connection is split into a [`PacketReader`] driven
//! by the owner's session loop and a writer task draining an unbounded send
//! queue, so callers never block (or hold a lock) while a packet is delivered.

use crate::Packet;
use bincode::{deserialize, serialize};
use log::{debug, error, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Largest accepted frame payload. Bigger frames close the connection.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Pause after a failed accept before trying again
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(10);

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: String,
        source: std::io::Error,
    },
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        source: std::io::Error,
    },
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),
    #[error("failed to encode packet: {0}")]
    Encode(#[from] bincode::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Items queued for a connection's writer task
#[derive(Debug)]
pub enum Outbound {
    Packet(Packet),
    /// Flush everything queued before this, then shut the socket down
    Close,
}

/// Cloneable handle used to send packets to one peer
#[derive(Debug, Clone)]
pub struct Connection {
    id: u64,
    peer: SocketAddr,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Connection {
    /// Creates a connection handle backed by a plain queue instead of a socket
    ///
    /// The network layer attaches the receiving end to a writer task; session
    /// tests read from it directly.
    pub fn queue(peer: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        (Self { id, peer, tx }, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queues a packet for delivery. Returns false once the connection is gone.
    pub fn send(&self, packet: Packet) -> bool {
        self.tx.send(Outbound::Packet(packet)).is_ok()
    }

    /// Closes the connection after already queued packets are written
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// What a session wants done with its connection after handling a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionFlow {
    Continue,
    Close,
}

/// Receiving half of a connection
pub struct PacketReader {
    reader: OwnedReadHalf,
    peer: SocketAddr,
}

impl PacketReader {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Reads the next raw frame payload. `Ok(None)` means the peer closed cleanly.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(len));
        }

        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload).await?;
        Ok(Some(payload))
    }

    /// Reads the next packet, skipping frames that fail to decode
    ///
    /// A malformed payload is logged and dropped; the connection stays usable.
    pub async fn recv(&mut self) -> Result<Option<Packet>, TransportError> {
        loop {
            let payload = match self.next_frame().await? {
                Some(payload) => payload,
                None => return Ok(None),
            };

            match deserialize::<Packet>(&payload) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => {
                    warn!(
                        "Dropping malformed packet ({} bytes) from {}: {}",
                        payload.len(),
                        self.peer,
                        e
                    );
                }
            }
        }
    }

    /// Feeds packets to `handle` until the peer leaves, the connection fails or
    /// the handler asks to close
    pub async fn drive<F>(mut self, mut handle: F)
    where
        F: FnMut(Packet) -> SessionFlow,
    {
        loop {
            match self.recv().await {
                Ok(Some(packet)) => {
                    if handle(packet) == SessionFlow::Close {
                        debug!("Closing connection to {}", self.peer);
                        return;
                    }
                }
                Ok(None) => {
                    debug!("{} disconnected", self.peer);
                    return;
                }
                Err(e) => {
                    warn!("Connection to {} failed: {}", self.peer, e);
                    return;
                }
            }
        }
    }
}

/// Encodes a packet into a length-prefixed frame
pub fn encode_frame(packet: &Packet) -> Result<Vec<u8>, TransportError> {
    let payload = serialize(packet)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Splits an accepted or connected stream and spawns its writer task
pub fn split(stream: TcpStream) -> Result<(Connection, PacketReader), TransportError> {
    let peer = stream.peer_addr()?;
    stream.set_nodelay(true)?;
    let (read_half, write_half) = stream.into_split();

    let (connection, rx) = Connection::queue(peer);
    tokio::spawn(write_loop(write_half, rx, peer));

    Ok((
        connection,
        PacketReader {
            reader: read_half,
            peer,
        },
    ))
}

pub async fn connect(addr: &str) -> Result<(Connection, PacketReader), TransportError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::ConnectFailed {
            addr: addr.to_string(),
            source,
        })?;
    split(stream)
}

pub async fn bind(addr: &str) -> Result<TcpListener, TransportError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::BindFailed {
            addr: addr.to_string(),
            source,
        })
}

/// Next incoming connection on `listener`
///
/// Accept errors (descriptor exhaustion, aborted handshakes) are logged and
/// retried, so a listener only stops when its owner drops it.
pub async fn accept(listener: &TcpListener) -> (TcpStream, SocketAddr) {
    accept_with(|| listener.accept()).await
}

async fn accept_with<T, F, Fut>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                error!("Error accepting connection: {}", e);
                sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    peer: SocketAddr,
) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Packet(packet) => {
                let frame = match encode_frame(&packet) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!("Failed to encode packet for {}: {}", peer, e);
                        continue;
                    }
                };
                if let Err(e) = writer.write_all(&frame).await {
                    debug!("Failed to write to {}: {}", peer, e);
                    break;
                }
            }
            Outbound::Close => break,
        }
    }

    let _ = writer.shutdown().await;
}
