//! Sync lifecycle events.

/// Observer interface for sync lifecycle events.
///
/// Methods are invoked synchronously from engine threads and must not block;
/// listeners that need to do real work should hand off to their own executor.
pub trait SyncEvents: Send + Sync {
    /// The node imported a peer-announced block as its new best block for
    /// the first time: initial sync is complete. Fires at most once per
    /// process.
    fn on_sync_done(&self) {}

    /// A validated header batch entered the queue.
    fn on_headers_received(&self, count: usize) {
        let _ = count;
    }

    /// Assembled blocks were handed to the import pipeline.
    fn on_blocks_queued(&self, count: usize) {
        let _ = count;
    }
}

/// Listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEvents;

impl SyncEvents for NullEvents {}
