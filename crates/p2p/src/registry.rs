//! Peer registry.
//!
//! Tracks live connections in two maps keyed by `host:port` - one for
//! inbound accepts, one for outbound dials - and resolves validator
//! identities to connections using the HELLO-announced node id, matching
//! the full identifier or its first label so short and fully-qualified
//! names interoperate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use minichain_types::{identity, H256};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::queue::OutboundQueue;

/// Direction a connection was established in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accepted by our listener
    Inbound,
    /// Dialed by us
    Outbound,
}

#[derive(Default)]
struct PeerInfo {
    node_id: Option<String>,
    listening_port: Option<u16>,
    last_heartbeat: Option<Instant>,
    height: u64,
    last_block_hash: Option<H256>,
}

/// One live peer connection shared by its reader and writer workers.
pub struct PeerConn {
    /// Socket address of the remote end (`host:port`)
    pub addr: String,
    /// How the connection was established
    pub direction: Direction,
    /// Outbound queue drained by this connection's writer
    pub queue: Arc<OutboundQueue>,
    info: Mutex<PeerInfo>,
}

impl PeerConn {
    /// Creates connection state with an empty queue.
    pub fn new(addr: impl Into<String>, direction: Direction, queue_capacity: usize) -> Self {
        let addr = addr.into();
        Self {
            queue: Arc::new(OutboundQueue::new(addr.clone(), queue_capacity)),
            addr,
            direction,
            info: Mutex::new(PeerInfo::default()),
        }
    }

    /// Records the peer's HELLO handshake.
    pub fn record_hello(&self, node_id: &str, listening_port: u16) {
        let mut info = self.info.lock();
        info.node_id = Some(node_id.to_string());
        info.listening_port = Some(listening_port);
        info.last_heartbeat = Some(Instant::now());
    }

    /// Records a heartbeat and the peer's announced chain position.
    pub fn record_heartbeat(&self, node_id: &str, height: u64, last_block_hash: H256) {
        let mut info = self.info.lock();
        if info.node_id.is_none() {
            info.node_id = Some(node_id.to_string());
        }
        info.last_heartbeat = Some(Instant::now());
        info.height = height;
        info.last_block_hash = Some(last_block_hash);
    }

    /// The identity the peer announced, if any.
    pub fn node_id(&self) -> Option<String> {
        self.info.lock().node_id.clone()
    }

    /// True when this connection's peer matches the identity (full or
    /// first-label).
    pub fn matches_identity(&self, id: &str) -> bool {
        self.info
            .lock()
            .node_id
            .as_deref()
            .is_some_and(|own| identity::matches(own, id))
    }

    fn status(&self, heartbeat_timeout: std::time::Duration) -> PeerStatus {
        let info = self.info.lock();
        let alive = info
            .last_heartbeat
            .is_some_and(|at| at.elapsed() <= heartbeat_timeout);
        PeerStatus {
            addr: self.addr.clone(),
            node_id: info.node_id.clone(),
            direction: self.direction,
            alive,
            height: info.height,
        }
    }
}

/// Snapshot of one peer for the operator interface.
#[derive(Debug, Clone)]
pub struct PeerStatus {
    /// Socket address
    pub addr: String,
    /// HELLO-announced identity, if received
    pub node_id: Option<String>,
    /// Connection direction
    pub direction: Direction,
    /// True when a heartbeat arrived within the liveness window
    pub alive: bool,
    /// Chain height the peer last announced
    pub height: u64,
}

#[derive(Default)]
struct RegistryInner {
    inbound: HashMap<String, Arc<PeerConn>>,
    outbound: HashMap<String, Arc<PeerConn>>,
}

/// Live-connection registry.
pub struct PeerRegistry {
    inner: RwLock<RegistryInner>,
}

impl PeerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Registers a connection, replacing any previous one at the same
    /// address and direction.
    pub fn insert(&self, conn: Arc<PeerConn>) {
        let mut inner = self.inner.write();
        let map = match conn.direction {
            Direction::Inbound => &mut inner.inbound,
            Direction::Outbound => &mut inner.outbound,
        };
        info!(peer = %conn.addr, direction = ?conn.direction, "connection registered");
        if let Some(old) = map.insert(conn.addr.clone(), conn) {
            old.queue.close();
        }
    }

    /// Removes a connection if it is still the registered one. A
    /// reconnect may already have replaced the entry at this address;
    /// the replacement is left alone.
    pub fn remove(&self, conn: &Arc<PeerConn>) {
        let mut inner = self.inner.write();
        let map = match conn.direction {
            Direction::Inbound => &mut inner.inbound,
            Direction::Outbound => &mut inner.outbound,
        };
        if map.get(&conn.addr).is_some_and(|c| Arc::ptr_eq(c, conn)) {
            map.remove(&conn.addr);
            debug!(peer = %conn.addr, direction = ?conn.direction, "connection removed");
        }
    }

    /// All live connections, outbound first.
    pub fn all(&self) -> Vec<Arc<PeerConn>> {
        let inner = self.inner.read();
        inner
            .outbound
            .values()
            .chain(inner.inbound.values())
            .cloned()
            .collect()
    }

    /// Resolves a validator identity to a cached connection.
    pub fn find_by_identity(&self, id: &str) -> Option<Arc<PeerConn>> {
        self.all().into_iter().find(|c| c.matches_identity(id))
    }

    /// Per-peer status snapshots for the operator interface.
    pub fn statuses(&self, heartbeat_timeout: std::time::Duration) -> Vec<PeerStatus> {
        self.all()
            .iter()
            .map(|c| c.status(heartbeat_timeout))
            .collect()
    }

    /// Closes every connection's queue (shutdown path).
    pub fn close_all(&self) {
        for conn in self.all() {
            conn.queue.close();
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.inbound.len() + inner.outbound.len()
    }

    /// True when no connections are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn identity_resolution_matches_first_label() {
        let registry = PeerRegistry::new();
        let conn = Arc::new(PeerConn::new("10.0.0.1:9000", Direction::Outbound, 8));
        conn.record_hello("node-1.cluster.local", 9000);
        registry.insert(conn);

        assert!(registry.find_by_identity("node-1").is_some());
        assert!(registry.find_by_identity("node-1.cluster.local").is_some());
        assert!(registry.find_by_identity("node-2").is_none());
    }

    #[test]
    fn liveness_follows_heartbeats() {
        let registry = PeerRegistry::new();
        let conn = Arc::new(PeerConn::new("10.0.0.1:9000", Direction::Inbound, 8));
        registry.insert(conn.clone());

        // No heartbeat yet: not alive.
        let status = &registry.statuses(Duration::from_secs(10))[0];
        assert!(!status.alive);

        conn.record_heartbeat("node-1", 4, H256::ZERO);
        let status = &registry.statuses(Duration::from_secs(10))[0];
        assert!(status.alive);
        assert_eq!(status.height, 4);
    }

    #[test]
    fn replacing_a_connection_closes_the_old_queue() {
        let registry = PeerRegistry::new();
        let old = Arc::new(PeerConn::new("10.0.0.1:9000", Direction::Outbound, 8));
        registry.insert(old.clone());
        registry.insert(Arc::new(PeerConn::new(
            "10.0.0.1:9000",
            Direction::Outbound,
            8,
        )));

        assert_eq!(registry.len(), 1);
        assert!(old
            .queue
            .push(minichain_wire::Message::GetHeaders {
                from_height: 0,
                to_height: 0
            })
            .is_err());
    }
}
