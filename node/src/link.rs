//! Node side of the master connection
//!
//! The link registers the node with the master, holds the handoff key the
//! master seals tokens with, and keeps retrying on a fixed interval whenever
//! the master is unreachable or the connection drops.
//!
//! Each registration attempt draws a fresh key. When the connection is lost
//! the key goes with it: tokens minted under the old registration stop being
//! accepted, matching the master, which forgets the node and its rooms.

use crate::lobby::NodeLobby;
use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use shared::handoff::{HandoffCapability, HandoffCodec, HandoffError, HandoffKey};
use shared::transport::{self, Connection, PacketReader};
use shared::{Packet, RoomId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Registering,
    Registered,
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub master_address: String,
    pub region: String,
    /// Address players are told to connect to
    pub advertised_address: String,
    pub retry_interval: Duration,
    pub token_max_age: Option<Duration>,
}

struct LinkInner {
    state: LinkState,
    master: Option<Connection>,
    codec: Option<HandoffCodec>,
    /// Bumped on every registration so a stale reader task cannot clear a newer one
    generation: u64,
}

struct RetryTask {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct NodeLink {
    settings: LinkSettings,
    lobby: Arc<NodeLobby>,
    register_lock: tokio::sync::Mutex<()>,
    inner: RwLock<LinkInner>,
    retry: Mutex<Option<RetryTask>>,
    stopped: AtomicBool,
}

impl NodeLink {
    pub fn new(settings: LinkSettings, lobby: Arc<NodeLobby>) -> Self {
        Self {
            settings,
            lobby,
            register_lock: tokio::sync::Mutex::new(()),
            inner: RwLock::new(LinkInner {
                state: LinkState::Disconnected,
                master: None,
                codec: None,
                generation: 0,
            }),
            retry: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn state(&self) -> LinkState {
        self.inner.read().state
    }

    pub fn is_registered(&self) -> bool {
        self.state() == LinkState::Registered
    }

    /// Registers once right away, then keeps retrying in the background
    pub async fn start(self: &Arc<Self>) {
        if self.stopped.load(Ordering::Acquire) || self.retry.lock().is_some() {
            return;
        }

        self.register().await;

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let link = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(link.settings.retry_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Skip the first tick since it fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        link.register().await;
                    }
                }
            }
            info!("Stopped reconnecting");
        });

        let mut retry = self.retry.lock();
        if retry.is_some() {
            // Lost a race against a concurrent start
            handle.abort();
        } else {
            *retry = Some(RetryTask { stop_tx, handle });
        }
    }

    /// One registration attempt. Returns whether the node is registered afterwards.
    pub async fn register(self: &Arc<Self>) -> bool {
        let _guard = self.register_lock.lock().await;

        if self.stopped.load(Ordering::Acquire) {
            return false;
        }
        if self.is_registered() {
            return true;
        }
        self.inner.write().state = LinkState::Registering;

        let address = &self.settings.master_address;
        let (master, reader) =
            match timeout(self.settings.retry_interval, transport::connect(address)).await {
                Ok(Ok(parts)) => parts,
                Ok(Err(e)) => {
                    warn!("Failed to connect to master: {}", e);
                    self.inner.write().state = LinkState::Disconnected;
                    return false;
                }
                Err(_) => {
                    warn!("Timed out connecting to master: {}", address);
                    self.inner.write().state = LinkState::Disconnected;
                    return false;
                }
            };
        info!("Connected to master: {}", address);

        let key = match HandoffKey::generate() {
            Ok(key) => key,
            Err(e) => {
                error!("Unable to generate handoff key: {}", e);
                master.close();
                self.inner.write().state = LinkState::Disconnected;
                return false;
            }
        };
        let codec = HandoffCodec::new(&key).with_max_age(self.settings.token_max_age);

        master.send(Packet::RegisterNode {
            region: self.settings.region.clone(),
            cipher_key: key.as_bytes().to_vec(),
            address: self.settings.advertised_address.clone(),
        });

        let generation = {
            let mut inner = self.inner.write();
            inner.generation += 1;
            inner.state = LinkState::Registered;
            inner.master = Some(master.clone());
            inner.codec = Some(codec);

            // Membership changes report under the read side of this lock, so
            // none can slip between these announcements and the new connection
            let mut announced = 0;
            for info in self.lobby.rooms().iter().filter_map(|room| room.announcement()) {
                master.send(Packet::UpdateRoom {
                    room: info,
                    remove: false,
                });
                announced += 1;
            }
            if announced > 0 {
                debug!("Re-announced {} rooms to master", announced);
            }

            inner.generation
        };

        info!(
            "Registered game node with address {} for region {}",
            self.settings.advertised_address, self.settings.region
        );

        tokio::spawn(watch_master(Arc::downgrade(self), reader, generation));
        true
    }

    /// Opens a handoff token presented for `room_id` with the current key
    pub fn verify(&self, room_id: RoomId, token: &[u8]) -> Result<HandoffCapability, HandoffError> {
        let codec = self.inner.read().codec.clone();
        codec.ok_or(HandoffError::NoKey)?.verify(room_id, token)
    }

    /// Queues a packet for the master. Returns false when not registered.
    pub fn send_to_master(&self, packet: Packet) -> bool {
        self.with_master(|master| master.map_or(false, |master| master.send(packet)))
    }

    /// Runs `f` with the current master connection, if any
    ///
    /// Registration waits for `f` to return. `f` must not call back into the link.
    pub fn with_master<R, F>(&self, f: F) -> R
    where
        F: FnOnce(Option<&Connection>) -> R,
    {
        let inner = self.inner.read();
        f(inner.master.as_ref())
    }

    fn connection_lost(&self, generation: u64) {
        let mut inner = self.inner.write();
        if inner.generation != generation || self.stopped.load(Ordering::Acquire) {
            return;
        }

        inner.state = LinkState::Disconnected;
        inner.master = None;
        inner.codec = None;
        warn!("Lost connection to master, retrying");
    }

    /// Stops retrying and closes the master connection
    ///
    /// When this returns no further registration attempt will run.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);

        let task = self.retry.lock().take();
        if let Some(task) = task {
            let _ = task.stop_tx.send(true);
            if let Err(e) = task.handle.await {
                warn!("Retry task ended abnormally: {}", e);
            }
        }

        // Wait out an attempt started outside the retry task
        let _guard = self.register_lock.lock().await;

        let master = {
            let mut inner = self.inner.write();
            inner.generation += 1;
            inner.state = LinkState::Disconnected;
            inner.codec = None;
            inner.master.take()
        };
        if let Some(master) = master {
            master.close();
        }
    }
}

/// Reads from the master until the connection ends, then reports the loss
async fn watch_master(link: Weak<NodeLink>, mut reader: PacketReader, generation: u64) {
    loop {
        match reader.recv().await {
            Ok(Some(packet)) => debug!("Ignoring packet from master: {:?}", packet),
            Ok(None) => break,
            Err(e) => {
                warn!("Master connection failed: {}", e);
                break;
            }
        }
    }

    if let Some(link) = link.upgrade() {
        link.connection_lost(generation);
    }
}
