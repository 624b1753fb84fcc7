//! Registry of game nodes currently connected to the master
//!
//! The registry is a plain list behind a read/write lock. The number of live
//! nodes is small (tens to low hundreds), so placement is a linear scan: the
//! node in the requested region with the fewest rooms wins, and among equals
//! the one registered first wins.

use log::info;
use parking_lot::RwLock;
use shared::handoff::{HandoffCodec, HandoffError, HandoffKey};
use shared::{NodeId, RoomId, UserId};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// What a node announces about itself when it registers
#[derive(Debug, Clone)]
pub struct NodeRegistration {
    pub region: String,
    pub address: String,
    pub cipher_key: HandoffKey,
}

/// A registered game node as seen by the master
pub struct NodeDescriptor {
    pub id: NodeId,
    /// Address clients connect to
    pub address: String,
    pub region: String,
    room_count: AtomicUsize,
    codec: HandoffCodec,
}

impl NodeDescriptor {
    fn new(id: NodeId, registration: NodeRegistration) -> Self {
        Self {
            id,
            address: registration.address,
            region: registration.region,
            room_count: AtomicUsize::new(0),
            codec: HandoffCodec::new(&registration.cipher_key),
        }
    }

    pub fn room_count(&self) -> usize {
        self.room_count.load(Ordering::Acquire)
    }

    pub fn increment_rooms(&self) -> usize {
        self.room_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the room counter, saturating at zero
    pub fn decrement_rooms(&self) -> usize {
        let previous = self
            .room_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    /// Mints a handoff token this node will accept for `room_id`
    pub fn issue_token(&self, user_id: UserId, room_id: RoomId) -> Result<Vec<u8>, HandoffError> {
        self.codec.issue(user_id, room_id)
    }
}

impl fmt::Debug for NodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDescriptor")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("region", &self.region)
            .field("room_count", &self.room_count())
            .finish_non_exhaustive()
    }
}

struct ClusterInner {
    nodes: Vec<Arc<NodeDescriptor>>,
    next_id: NodeId,
}

pub struct ClusterRegistry {
    inner: RwLock<ClusterInner>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(ClusterInner {
                nodes: Vec::new(),
                next_id: 1,
            }),
        }
    }

    /// Adds a node and assigns it the next id. Ids are never reused.
    pub fn add(&self, registration: NodeRegistration) -> Arc<NodeDescriptor> {
        let mut inner = self.inner.write();

        let id = inner.next_id;
        inner.next_id += 1;

        let node = Arc::new(NodeDescriptor::new(id, registration));
        inner.nodes.push(Arc::clone(&node));
        node
    }

    /// Removes a node. Removing an unknown id is a no-op.
    pub fn remove(&self, id: NodeId) -> Option<Arc<NodeDescriptor>> {
        let mut inner = self.inner.write();
        let position = inner.nodes.iter().position(|node| node.id == id)?;
        let node = inner.nodes.remove(position);
        info!(
            "Node {} ({}) left the cluster, {} nodes remaining",
            node.id,
            node.region,
            inner.nodes.len()
        );
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<NodeDescriptor>> {
        self.inner
            .read()
            .nodes
            .iter()
            .find(|node| node.id == id)
            .cloned()
    }

    /// Returns the node in `region` with the fewest rooms, first registered on ties
    pub fn best_for_region(&self, region: &str) -> Option<Arc<NodeDescriptor>> {
        let inner = self.inner.read();

        let mut best: Option<&Arc<NodeDescriptor>> = None;
        for node in inner.nodes.iter().filter(|node| node.region == region) {
            match best {
                Some(current) if node.room_count() >= current.room_count() => {}
                _ => best = Some(node),
            }
        }

        best.cloned()
    }

    /// Copy of the current node list in registration order
    pub fn nodes(&self) -> Vec<Arc<NodeDescriptor>> {
        self.inner.read().nodes.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().nodes.is_empty()
    }
}

impl Default for ClusterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
