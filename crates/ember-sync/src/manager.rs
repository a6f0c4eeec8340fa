//! Sync engine orchestration: ingress from wire handlers, the fetch loops,
//! and the importer.

use crate::prefetch::SenderPrefetch;
use crate::{BlockWrapper, HeaderWrapper, SyncConfig, SyncEvents, SyncQueue, SyncResult};
use ember_chain::{Chain, HeaderValidator, ImportResult};
use ember_core::{Block, BlockHeader, H256};
use ember_network::{BlockId, PeerId, PeerPool, RequestKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, error, info, warn};

/// Block synchronization engine.
///
/// Owns the reassembly queue and the import pipeline. Wire handlers feed it
/// through the ingress methods (`add_list`, `validate_and_add_new_block`,
/// `validate_and_add_headers`); the loops spawned by [`SyncManager::start`]
/// drive demand against the peer pool and the queue.
pub struct SyncManager {
    config: SyncConfig,
    chain: Arc<dyn Chain>,
    pool: Arc<dyn PeerPool>,
    validator: Arc<dyn HeaderValidator>,
    events: Arc<dyn SyncEvents>,
    queue: Mutex<SyncQueue>,
    prefetch: SenderPrefetch,
    /// Hashes announced as peer heads, by height; consulted when the
    /// announced block finally assembles so its wrapper keeps the flag.
    announced: Mutex<HashMap<H256, u64>>,
    import_tx: Mutex<Option<mpsc::Sender<BlockWrapper>>>,
    import_rx: Mutex<Option<mpsc::Receiver<BlockWrapper>>>,
    pipeline_handles: Mutex<Vec<JoinHandle<()>>>,
    headers_arrived: Notify,
    bodies_arrived: Notify,
    stopping: Notify,
    sync_done: AtomicBool,
    shutdown: AtomicBool,
}

impl SyncManager {
    /// Create the engine.
    ///
    /// The chain must already be initialized: the queue anchors at
    /// `chain.head()`. Must be called inside a tokio runtime (the sender
    /// prefetch workers spawn immediately so ingress works before
    /// [`SyncManager::start`]).
    pub fn new(
        config: SyncConfig,
        chain: Arc<dyn Chain>,
        pool: Arc<dyn PeerPool>,
        validator: Arc<dyn HeaderValidator>,
        events: Arc<dyn SyncEvents>,
    ) -> Arc<Self> {
        let head = chain.head();
        let queue = SyncQueue::new(&head, config.header_request_window);
        let (import_tx, import_rx) = mpsc::channel(config.import_queue_cap.max(1));

        let (prefetch, pipeline_handles) = if config.sync_enabled {
            let (prefetch, handles) = SenderPrefetch::spawn(
                config.prefetch_workers,
                config.prefetch_buffer,
                import_tx.clone(),
            );
            (prefetch, handles)
        } else {
            (SenderPrefetch::disabled(), Vec::new())
        };

        info!(
            head = head.number,
            hash = %head.hash(),
            "Sync queue anchored at chain head"
        );

        Arc::new(Self {
            config,
            chain,
            pool,
            validator,
            events,
            queue: Mutex::new(queue),
            prefetch,
            announced: Mutex::new(HashMap::new()),
            import_tx: Mutex::new(Some(import_tx)),
            import_rx: Mutex::new(Some(import_rx)),
            pipeline_handles: Mutex::new(pipeline_handles),
            headers_arrived: Notify::new(),
            bodies_arrived: Notify::new(),
            stopping: Notify::new(),
            sync_done: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Spawn the fetch loops, the importer, and the status task.
    ///
    /// The owner calls this once the chain subsystem is ready. With
    /// `sync_enabled = false` nothing is spawned.
    pub fn start(self: &Arc<Self>) -> SyncHandle {
        let mut tasks: Vec<JoinHandle<()>> = self.pipeline_handles.lock().drain(..).collect();

        if !self.config.sync_enabled {
            info!("Sync manager: OFF");
            return SyncHandle {
                manager: Arc::clone(self),
                tasks,
            };
        }
        info!("Sync manager: ON");

        tasks.push(tokio::spawn(Arc::clone(self).header_fetch_loop()));
        tasks.push(tokio::spawn(Arc::clone(self).body_fetch_loop()));
        tasks.push(tokio::spawn(Arc::clone(self).status_loop()));

        if let Some(rx) = self.import_rx.lock().take() {
            let manager = Arc::clone(self);
            tasks.push(tokio::task::spawn_blocking(move || manager.import_loop(rx)));
        }

        SyncHandle {
            manager: Arc::clone(self),
            tasks,
        }
    }

    /// Whether the initial sync has completed.
    pub fn is_sync_done(&self) -> bool {
        self.sync_done.load(Ordering::Acquire)
    }

    /// Headers waiting for bodies.
    pub fn headers_backlog(&self) -> usize {
        self.queue.lock().headers_count()
    }

    /// Blocks currently queued for import.
    pub fn import_queue_size(&self) -> usize {
        self.import_queue_len()
    }

    // ==================== Ingress ====================

    /// Handle a `GetBlockBodies` response from a peer.
    ///
    /// Newly contiguous blocks are handed to the sender-prefetch stage in
    /// chain order; the body fetch loop is woken.
    pub fn add_list(&self, blocks: Vec<Block>, node_id: &PeerId) {
        if blocks.is_empty() {
            return;
        }
        let last_number = blocks.last().map(Block::number);
        let ready = self.queue.lock().add_blocks(blocks);
        self.dispatch_ready(ready, node_id);
        self.bodies_arrived.notify_one();
        debug!(
            import_queue = self.import_queue_len(),
            last_number, "Bodies processed"
        );
    }

    /// Validate and enqueue a block announced as a peer's head.
    ///
    /// Returns false when the header fails validation. The announced hash is
    /// remembered so that its wrapper carries `is_new_block` whenever the
    /// block assembles, immediately or after backfill closes the gap.
    pub fn validate_and_add_new_block(&self, block: Block, node_id: &PeerId) -> bool {
        if !self.is_valid(&block.header) {
            return false;
        }
        let hash = block.hash();
        self.announced.lock().insert(hash, block.number());
        debug!(number = block.number(), hash = %hash, "New block announced");

        let ready = {
            let mut queue = self.queue.lock();
            queue.add_headers(vec![HeaderWrapper::new(block.header.clone(), node_id.clone())]);
            queue.add_blocks(vec![block])
        };
        self.dispatch_ready(ready, node_id);
        true
    }

    /// Validate and insert a `GetBlockHeaders` response.
    ///
    /// A single invalid header rejects the whole batch; nothing from a
    /// rejected batch reaches the queue. The header fetch loop is woken on
    /// success.
    pub fn validate_and_add_headers(&self, headers: Vec<BlockHeader>, node_id: &PeerId) -> bool {
        if headers.is_empty() {
            return true;
        }
        let mut wrappers = Vec::with_capacity(headers.len());
        for header in headers {
            if !self.is_valid(&header) {
                return false;
            }
            wrappers.push(HeaderWrapper::new(header, node_id.clone()));
        }
        let count = wrappers.len();
        self.queue.lock().add_headers(wrappers);
        self.headers_arrived.notify_one();
        self.events.on_headers_received(count);
        debug!(count, "Headers added");
        true
    }

    // ==================== Internals ====================

    /// Wrap newly assembled blocks and push them into the prefetch stage.
    fn dispatch_ready(&self, ready: Vec<Block>, node_id: &PeerId) {
        if ready.is_empty() {
            return;
        }
        self.events.on_blocks_queued(ready.len());

        let wrappers = {
            let mut announced = self.announced.lock();
            let anchor = self.queue.lock().anchor().0;
            let wrappers: Vec<BlockWrapper> = ready
                .into_iter()
                .map(|block| {
                    if announced.remove(&block.hash()).is_some() {
                        BlockWrapper::announced(block, node_id.clone())
                    } else {
                        BlockWrapper::backfill(block, node_id.clone())
                    }
                })
                .collect();
            // Announcements that lost to a competing candidate never
            // assemble; drop them once their height is resolved.
            announced.retain(|_, number| *number > anchor);
            wrappers
        };

        self.prefetch.push_all(wrappers);
    }

    fn is_valid(&self, header: &BlockHeader) -> bool {
        if let Err(err) = self.validator.validate(header) {
            warn!(
                number = header.number,
                hash = %header.hash(),
                error = %err,
                "Rejected invalid header"
            );
            debug!(rlp = hex::encode(header.encoded()), "Invalid header dump");
            return false;
        }
        true
    }

    fn import_queue_len(&self) -> usize {
        match self.import_tx.lock().as_ref() {
            Some(tx) => tx.max_capacity() - tx.capacity(),
            None => 0,
        }
    }

    // ==================== Loops ====================

    async fn header_fetch_loop(self: Arc<Self>) {
        info!("Header fetch loop started");
        while !self.shutdown.load(Ordering::Acquire) {
            if let Err(err) = self.header_fetch_cycle() {
                error!(error = %err, "Unexpected error in header fetch loop");
            }
            let _ = time::timeout(
                self.config.fetch_wait_timeout(),
                self.headers_arrived.notified(),
            )
            .await;
        }
        info!("Header fetch loop stopped");
    }

    fn header_fetch_cycle(&self) -> SyncResult<()> {
        let backlog = self.queue.lock().headers_count();
        if backlog >= self.config.header_backlog_cap {
            return Ok(());
        }
        let Some(peer) = self.pool.any_idle(RequestKind::Headers) else {
            return Ok(());
        };
        let request = self.queue.lock().request_headers();
        debug!(
            peer = %peer.peer_id(),
            start = request.start,
            count = request.count,
            "Requesting headers"
        );
        peer.send_get_block_headers(
            BlockId::Number(request.start),
            request.count,
            request.reverse,
        )?;
        Ok(())
    }

    async fn body_fetch_loop(self: Arc<Self>) {
        info!("Body fetch loop started");
        while !self.shutdown.load(Ordering::Acquire) {
            if let Err(err) = self.body_fetch_cycle() {
                error!(error = %err, "Unexpected error in body fetch loop");
            }
            let _ = time::timeout(
                self.config.fetch_wait_timeout(),
                self.bodies_arrived.notified(),
            )
            .await;
        }
        info!("Body fetch loop stopped");
    }

    fn body_fetch_cycle(&self) -> SyncResult<()> {
        if self.import_queue_len() >= self.config.import_queue_cap {
            return Ok(());
        }
        let request = self
            .queue
            .lock()
            .request_blocks(self.config.body_request_batch);
        if request.is_empty() {
            return Ok(());
        }
        let mut dispatched = 0usize;
        for chunk in request.split(self.config.body_request_chunk) {
            // Chunks without an idle peer are retried next cycle.
            let Some(peer) = self.pool.any_idle(RequestKind::Bodies) else {
                break;
            };
            peer.send_get_block_bodies(&chunk.headers)?;
            dispatched += 1;
        }
        if dispatched > 0 {
            debug!(dispatched, "Body request chunks dispatched");
        }
        Ok(())
    }

    /// Single consumer of the import queue. Runs on a blocking thread and
    /// exits once the queue is closed and drained.
    fn import_loop(&self, mut rx: mpsc::Receiver<BlockWrapper>) {
        info!("Importer started");
        while let Some(wrapper) = rx.blocking_recv() {
            self.import_one(&wrapper);
        }
        info!("Importer stopped");
    }

    fn import_one(&self, wrapper: &BlockWrapper) {
        let block = &wrapper.block;
        match self.chain.try_connect(block) {
            Ok(ImportResult::ImportedBest) => {
                info!(
                    number = block.number(),
                    hash = %block.hash(),
                    txs = block.transactions.len(),
                    "Imported new best block"
                );
                if wrapper.is_new_block && !self.sync_done.swap(true, Ordering::AcqRel) {
                    info!(number = block.number(), "Initial sync complete");
                    self.events.on_sync_done();
                }
                self.post_import_dump(block);
            }
            Ok(ImportResult::ImportedNotBest) => {
                info!(
                    number = block.number(),
                    hash = %block.hash(),
                    txs = block.transactions.len(),
                    "Imported side-chain block"
                );
                self.post_import_dump(block);
            }
            Ok(ImportResult::Exists) => {
                debug!(number = block.number(), "Block already known");
            }
            Ok(ImportResult::NoParent) => {
                // Should not happen: the queue emits parent-linked blocks
                // only. Indicates a race with another chain writer.
                error!(
                    number = block.number(),
                    hash = %block.hash(),
                    "No parent on chain for imported block"
                );
            }
            Ok(ImportResult::Invalid) => {
                error!(number = block.number(), hash = %block.hash(), "Chain rejected block");
                error!(rlp = hex::encode(block.encoded()), "Block dump");
            }
            Err(err) => {
                error!(
                    number = block.number(),
                    error = %err,
                    "Error connecting block"
                );
                error!(rlp = hex::encode(block.encoded()), "Block dump");
            }
        }
    }

    /// After initial sync every import is interesting enough to dump.
    fn post_import_dump(&self, block: &Block) {
        if self.is_sync_done() && tracing::enabled!(tracing::Level::DEBUG) {
            debug!(rlp = hex::encode(block.encoded()), "Block dump");
        }
    }

    async fn status_loop(self: Arc<Self>) {
        let mut ticker = time::interval(self.config.log_interval());
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.stopping.notified() => break,
            }
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            self.pool.log_active_peers();
            let (headers, bodies, anchor) = {
                let queue = self.queue.lock();
                (queue.headers_count(), queue.bodies_count(), queue.anchor().0)
            };
            info!(
                headers,
                bodies,
                anchor,
                import_queue = self.import_queue_len(),
                sync_done = self.is_sync_done(),
                "Sync status"
            );
        }
    }

    /// Begin shutdown: stop the loops and close the pipeline so the importer
    /// drains the queue and exits.
    fn begin_shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Sync manager stopping");
        self.prefetch.close();
        self.import_tx.lock().take();
        self.headers_arrived.notify_waiters();
        self.bodies_arrived.notify_waiters();
        self.stopping.notify_waiters();
    }
}

/// Handle to a started engine; stopping it drains the pipeline.
pub struct SyncHandle {
    manager: Arc<SyncManager>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandle {
    /// The engine behind this handle.
    pub fn manager(&self) -> &Arc<SyncManager> {
        &self.manager
    }

    /// Signal shutdown and wait for the loops and the pipeline, giving up
    /// after `deadline`. The import queue is drained before the importer
    /// exits; tasks still running at the deadline are left to finish behind
    /// the scenes.
    pub async fn stop(mut self, deadline: Duration) {
        self.manager.begin_shutdown();
        let started = Instant::now();
        for task in self.tasks.drain(..) {
            let remaining = deadline.saturating_sub(started.elapsed());
            if time::timeout(remaining, task).await.is_err() {
                warn!("Sync task did not stop within the deadline");
            }
        }
    }
}
