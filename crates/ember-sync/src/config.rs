//! Sync engine configuration.

use crate::{
    BODY_REQUEST_BATCH, BODY_REQUEST_CHUNK, HEADER_BACKLOG_CAP, HEADER_REQUEST_WINDOW,
    IMPORT_QUEUE_CAP,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Master switch; when false the engine starts no loops.
    pub sync_enabled: bool,
    /// Max headers kept waiting for bodies before the header loop pauses.
    pub header_backlog_cap: usize,
    /// Capacity of the import queue between prefetch and the importer.
    pub import_queue_cap: usize,
    /// Headers considered per body-request cycle.
    pub body_request_batch: usize,
    /// Headers per `GetBlockBodies` dispatched to a single peer.
    pub body_request_chunk: usize,
    /// Sender-recovery worker count.
    pub prefetch_workers: usize,
    /// Bounded buffer in front of the recovery workers.
    pub prefetch_buffer: usize,
    /// Height window of a single headers request.
    pub header_request_window: u64,
    /// How long the fetch loops wait for an arrival signal, milliseconds.
    pub fetch_wait_millis: u64,
    /// Interval of the periodic status log, seconds.
    pub log_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_enabled: true,
            header_backlog_cap: HEADER_BACKLOG_CAP,
            import_queue_cap: IMPORT_QUEUE_CAP,
            body_request_batch: BODY_REQUEST_BATCH,
            body_request_chunk: BODY_REQUEST_CHUNK,
            prefetch_workers: 4,
            prefetch_buffer: 1_000,
            header_request_window: HEADER_REQUEST_WINDOW,
            fetch_wait_millis: 2_000,
            log_interval_secs: 30,
        }
    }
}

impl SyncConfig {
    /// Arrival-signal wait timeout of the fetch loops.
    pub fn fetch_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_wait_millis)
    }

    /// Interval of the periodic status log.
    pub fn log_interval(&self) -> Duration {
        Duration::from_secs(self.log_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = SyncConfig::default();
        assert!(config.sync_enabled);
        assert_eq!(config.header_backlog_cap, 20_000);
        assert_eq!(config.import_queue_cap, 20_000);
        assert_eq!(config.body_request_batch, 1_000);
        assert_eq!(config.body_request_chunk, 100);
        assert_eq!(config.prefetch_workers, 4);
        assert_eq!(config.prefetch_buffer, 1_000);
        assert_eq!(config.fetch_wait_timeout(), Duration::from_secs(2));
        assert_eq!(config.log_interval(), Duration::from_secs(30));
    }

    #[test]
    fn log_interval_has_a_floor() {
        let config = SyncConfig {
            log_interval_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.log_interval(), Duration::from_secs(1));
    }
}
