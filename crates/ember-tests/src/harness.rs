//! Test harness: scripted peers, validators, listeners, and a full engine
//! fixture with fast timeouts.

use crate::generators;
use ember_chain::{Chain, ChainResult, HeaderError, HeaderValidator, ImportResult, MemoryChain};
use ember_core::{Block, BlockHeader, H256};
use ember_network::{BlockId, NetworkResult, PeerHandler, PeerId, PeerPool, RequestKind};
use ember_sync::{SyncConfig, SyncEvents, SyncManager};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Peer handler that records every request the engine dispatches.
pub struct ScriptedPeer {
    id: PeerId,
    /// Recorded `GetBlockHeaders` requests.
    pub header_requests: Mutex<Vec<(BlockId, u32, bool)>>,
    /// Recorded `GetBlockBodies` requests, as header hashes.
    pub body_requests: Mutex<Vec<Vec<H256>>>,
}

impl ScriptedPeer {
    /// Create a peer with the given id byte.
    pub fn new(id: u8) -> Arc<Self> {
        Arc::new(Self {
            id: PeerId::from_bytes(vec![id; 8]),
            header_requests: Mutex::new(Vec::new()),
            body_requests: Mutex::new(Vec::new()),
        })
    }

    /// Total requests of both kinds.
    pub fn request_count(&self) -> usize {
        self.header_requests.lock().len() + self.body_requests.lock().len()
    }

    /// Number of body requests recorded so far.
    pub fn body_request_count(&self) -> usize {
        self.body_requests.lock().len()
    }

    /// Number of header requests recorded so far.
    pub fn header_request_count(&self) -> usize {
        self.header_requests.lock().len()
    }
}

impl PeerHandler for ScriptedPeer {
    fn peer_id(&self) -> PeerId {
        self.id.clone()
    }

    fn send_get_block_headers(
        &self,
        start: BlockId,
        count: u32,
        reverse: bool,
    ) -> NetworkResult<()> {
        self.header_requests.lock().push((start, count, reverse));
        Ok(())
    }

    fn send_get_block_bodies(&self, headers: &[BlockHeader]) -> NetworkResult<()> {
        self.body_requests
            .lock()
            .push(headers.iter().map(BlockHeader::hash).collect());
        Ok(())
    }
}

/// Pool handing out a single scripted peer (or nothing), counting calls.
pub struct SinglePeerPool {
    peer: Option<Arc<ScriptedPeer>>,
    calls: AtomicUsize,
}

impl SinglePeerPool {
    /// Pool that always yields `peer`.
    pub fn with(peer: Arc<ScriptedPeer>) -> Arc<Self> {
        Arc::new(Self {
            peer: Some(peer),
            calls: AtomicUsize::new(0),
        })
    }

    /// Pool with no peers at all.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            peer: None,
            calls: AtomicUsize::new(0),
        })
    }

    /// How many times the engine probed for an idle peer.
    pub fn probe_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl PeerPool for SinglePeerPool {
    fn any_idle(&self, _kind: RequestKind) -> Option<Arc<dyn PeerHandler>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.peer
            .as_ref()
            .map(|peer| Arc::clone(peer) as Arc<dyn PeerHandler>)
    }
}

/// Validator rejecting a scripted set of header hashes, accepting the rest.
#[derive(Default)]
pub struct ScriptedValidator {
    bad: HashSet<H256>,
}

impl ScriptedValidator {
    /// Accept every header.
    pub fn accept_all() -> Self {
        Self::default()
    }

    /// Reject exactly the given hashes.
    pub fn rejecting(bad: impl IntoIterator<Item = H256>) -> Self {
        Self {
            bad: bad.into_iter().collect(),
        }
    }
}

impl HeaderValidator for ScriptedValidator {
    fn validate(&self, header: &BlockHeader) -> Result<(), HeaderError> {
        if self.bad.contains(&header.hash()) {
            return Err(HeaderError::Other("scripted rejection".into()));
        }
        Ok(())
    }
}

/// Counts lifecycle events.
#[derive(Default)]
pub struct RecordingEvents {
    sync_done: AtomicUsize,
    headers: AtomicUsize,
    blocks: AtomicUsize,
}

impl RecordingEvents {
    /// Times `on_sync_done` fired.
    pub fn sync_done_count(&self) -> usize {
        self.sync_done.load(Ordering::Relaxed)
    }

    /// Total headers reported through `on_headers_received`.
    pub fn headers_received(&self) -> usize {
        self.headers.load(Ordering::Relaxed)
    }

    /// Total blocks reported through `on_blocks_queued`.
    pub fn blocks_queued(&self) -> usize {
        self.blocks.load(Ordering::Relaxed)
    }
}

impl SyncEvents for RecordingEvents {
    fn on_sync_done(&self) {
        self.sync_done.fetch_add(1, Ordering::Relaxed);
    }

    fn on_headers_received(&self, count: usize) {
        self.headers.fetch_add(count, Ordering::Relaxed);
    }

    fn on_blocks_queued(&self, count: usize) {
        self.blocks.fetch_add(count, Ordering::Relaxed);
    }
}

/// In-memory chain whose imports can be paused by the test, with per-block
/// call counting.
pub struct GatedChain {
    inner: MemoryChain,
    paused: std::sync::atomic::AtomicBool,
    connects: Mutex<HashMap<H256, usize>>,
}

impl GatedChain {
    /// Chain rooted at the given genesis.
    pub fn new(genesis: Block) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryChain::new(genesis),
            paused: std::sync::atomic::AtomicBool::new(false),
            connects: Mutex::new(HashMap::new()),
        })
    }

    /// While paused, the importer stalls inside `try_connect`.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    /// The wrapped chain.
    pub fn inner(&self) -> &MemoryChain {
        &self.inner
    }

    /// Height of the best block.
    pub fn head_number(&self) -> u64 {
        self.inner.head_number()
    }

    /// How many times `try_connect` ran for this block hash.
    pub fn connect_count(&self, hash: &H256) -> usize {
        self.connects.lock().get(hash).copied().unwrap_or(0)
    }
}

impl Chain for GatedChain {
    fn head(&self) -> BlockHeader {
        self.inner.head()
    }

    fn try_connect(&self, block: &Block) -> ChainResult<ImportResult> {
        // Runs on the importer's blocking thread, so sleeping is fine.
        while self.paused.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(1));
        }
        *self.connects.lock().entry(block.hash()).or_insert(0) += 1;
        self.inner.try_connect(block)
    }
}

/// A wired-up engine with fast timeouts and a single scripted peer.
pub struct SyncFixture {
    /// The engine under test.
    pub manager: Arc<SyncManager>,
    /// The chain it imports into.
    pub chain: Arc<GatedChain>,
    /// The scripted peer behind the pool.
    pub peer: Arc<ScriptedPeer>,
    /// The pool handed to the engine.
    pub pool: Arc<SinglePeerPool>,
    /// The recorded listener.
    pub events: Arc<RecordingEvents>,
    /// Peer id used when calling ingress methods.
    pub node: PeerId,
}

impl SyncFixture {
    /// Config with millisecond-scale waits for tests.
    pub fn fast_config() -> SyncConfig {
        SyncConfig {
            fetch_wait_millis: 50,
            log_interval_secs: 1,
            ..Default::default()
        }
    }

    /// Fixture with the fast config and an accept-all validator.
    pub fn new() -> Self {
        Self::with_config(Self::fast_config())
    }

    /// Fixture with a custom config and an accept-all validator.
    pub fn with_config(config: SyncConfig) -> Self {
        Self::build(config, ScriptedValidator::accept_all(), false)
    }

    /// Fixture with a custom validator.
    pub fn with_validator(validator: ScriptedValidator) -> Self {
        Self::build(Self::fast_config(), validator, false)
    }

    /// Fixture whose pool never yields a peer. The scripted peer still
    /// exists for ingress calls but is unreachable through the pool.
    pub fn starved() -> Self {
        Self::build(Self::fast_config(), ScriptedValidator::accept_all(), true)
    }

    fn build(config: SyncConfig, validator: ScriptedValidator, starved: bool) -> Self {
        let chain = GatedChain::new(generators::genesis());
        let peer = ScriptedPeer::new(1);
        let pool = if starved {
            SinglePeerPool::empty()
        } else {
            SinglePeerPool::with(Arc::clone(&peer))
        };
        let events = Arc::new(RecordingEvents::default());
        let node = peer.peer_id();
        let manager = SyncManager::new(
            config,
            chain.clone() as Arc<dyn Chain>,
            pool.clone() as Arc<dyn PeerPool>,
            Arc::new(validator),
            events.clone() as Arc<dyn SyncEvents>,
        );
        Self {
            manager,
            chain,
            peer,
            pool,
            events,
            node,
        }
    }
}

impl Default for SyncFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
