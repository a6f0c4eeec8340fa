//! Peer identity and the idle-peer registry.

use crate::{PeerHandler, RequestKind};
use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Unique peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub Vec<u8>);

impl PeerId {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Source of idle peers for the request loops.
///
/// An idle peer has no outstanding request of the given kind. `any_idle` is
/// non-blocking; `None` means the loops back off until the next cycle.
pub trait PeerPool: Send + Sync {
    /// Pick an idle peer for a request of the given kind, if any.
    fn any_idle(&self, kind: RequestKind) -> Option<Arc<dyn PeerHandler>>;

    /// Emit a log line describing current peer activity.
    fn log_active_peers(&self) {}
}

struct PeerEntry {
    handler: Arc<dyn PeerHandler>,
    headers_since: Option<Instant>,
    bodies_since: Option<Instant>,
}

impl PeerEntry {
    fn slot(&mut self, kind: RequestKind) -> &mut Option<Instant> {
        match kind {
            RequestKind::Headers => &mut self.headers_since,
            RequestKind::Bodies => &mut self.bodies_since,
        }
    }

    fn idle(&self, kind: RequestKind, timeout: Duration) -> bool {
        let since = match kind {
            RequestKind::Headers => self.headers_since,
            RequestKind::Bodies => self.bodies_since,
        };
        match since {
            None => true,
            // A response that never came; the claim expires so the peer can
            // be asked again.
            Some(at) => at.elapsed() > timeout,
        }
    }
}

/// Default expiry for an unanswered request claim.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Registry of connected peers with per-kind outstanding-request tracking.
///
/// `any_idle` claims the returned peer for that request kind; the wire layer
/// releases the claim with [`SyncPeers::finish_request`] when the response
/// (or a transport error) arrives. Claims expire after `request_timeout` so
/// a silent peer does not stay reserved forever.
pub struct SyncPeers {
    peers: DashMap<PeerId, PeerEntry>,
    request_timeout: Duration,
}

impl SyncPeers {
    /// Create a registry with the given claim expiry.
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            peers: DashMap::new(),
            request_timeout,
        }
    }

    /// Add a connected peer.
    pub fn register(&self, handler: Arc<dyn PeerHandler>) {
        let id = handler.peer_id();
        debug!(peer = %id, "Peer registered");
        self.peers.insert(
            id,
            PeerEntry {
                handler,
                headers_since: None,
                bodies_since: None,
            },
        );
    }

    /// Remove a disconnected peer.
    pub fn deregister(&self, id: &PeerId) {
        if self.peers.remove(id).is_some() {
            debug!(peer = %id, "Peer deregistered");
        }
    }

    /// Release a request claim after its response arrived.
    pub fn finish_request(&self, id: &PeerId, kind: RequestKind) {
        if let Some(mut entry) = self.peers.get_mut(id) {
            *entry.slot(kind) = None;
        }
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Default for SyncPeers {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl PeerPool for SyncPeers {
    fn any_idle(&self, kind: RequestKind) -> Option<Arc<dyn PeerHandler>> {
        let idle: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|entry| entry.value().idle(kind, self.request_timeout))
            .map(|entry| entry.key().clone())
            .collect();

        let chosen = idle.choose(&mut rand::thread_rng())?.clone();
        let mut entry = self.peers.get_mut(&chosen)?;
        if !entry.idle(kind, self.request_timeout) {
            // Claimed by a concurrent caller between the scan and the lock.
            warn!(peer = %chosen, "Peer claimed concurrently, retrying next cycle");
            return None;
        }
        *entry.slot(kind) = Some(Instant::now());
        Some(Arc::clone(&entry.handler))
    }

    fn log_active_peers(&self) {
        let total = self.peers.len();
        let mut busy_headers = 0usize;
        let mut busy_bodies = 0usize;
        for entry in self.peers.iter() {
            if !entry.value().idle(RequestKind::Headers, self.request_timeout) {
                busy_headers += 1;
            }
            if !entry.value().idle(RequestKind::Bodies, self.request_timeout) {
                busy_bodies += 1;
            }
        }
        info!(total, busy_headers, busy_bodies, "Active peers");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockId, NetworkResult};
    use ember_core::BlockHeader;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubHandler {
        id: PeerId,
        headers_sent: AtomicUsize,
    }

    impl StubHandler {
        fn new(byte: u8) -> Arc<Self> {
            Arc::new(Self {
                id: PeerId::from_bytes(vec![byte; 4]),
                headers_sent: AtomicUsize::new(0),
            })
        }
    }

    impl PeerHandler for StubHandler {
        fn peer_id(&self) -> PeerId {
            self.id.clone()
        }

        fn send_get_block_headers(
            &self,
            _start: BlockId,
            _count: u32,
            _reverse: bool,
        ) -> NetworkResult<()> {
            self.headers_sent.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn send_get_block_bodies(&self, _headers: &[BlockHeader]) -> NetworkResult<()> {
            Ok(())
        }
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let pool = SyncPeers::default();
        assert!(pool.any_idle(RequestKind::Headers).is_none());
    }

    #[test]
    fn claim_blocks_reuse_until_finished() {
        let pool = SyncPeers::default();
        pool.register(StubHandler::new(1));

        let first = pool.any_idle(RequestKind::Headers);
        assert!(first.is_some());
        assert!(pool.any_idle(RequestKind::Headers).is_none());

        pool.finish_request(&first.unwrap().peer_id(), RequestKind::Headers);
        assert!(pool.any_idle(RequestKind::Headers).is_some());
    }

    #[test]
    fn kinds_are_claimed_independently() {
        let pool = SyncPeers::default();
        pool.register(StubHandler::new(2));

        assert!(pool.any_idle(RequestKind::Headers).is_some());
        assert!(pool.any_idle(RequestKind::Bodies).is_some());
        assert!(pool.any_idle(RequestKind::Bodies).is_none());
    }

    #[test]
    fn expired_claims_are_reusable() {
        let pool = SyncPeers::new(Duration::from_millis(0));
        pool.register(StubHandler::new(3));

        assert!(pool.any_idle(RequestKind::Headers).is_some());
        std::thread::sleep(Duration::from_millis(5));
        assert!(pool.any_idle(RequestKind::Headers).is_some());
    }

    #[test]
    fn deregistered_peers_disappear() {
        let pool = SyncPeers::default();
        let handler = StubHandler::new(4);
        pool.register(handler.clone());
        assert_eq!(pool.len(), 1);

        pool.deregister(&handler.peer_id());
        assert!(pool.is_empty());
        assert!(pool.any_idle(RequestKind::Bodies).is_none());
    }
}
