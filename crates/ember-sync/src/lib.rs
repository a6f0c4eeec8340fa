//! # ember-sync
//!
//! Block synchronization engine for the Ember node.
//!
//! The engine brings the local chain up to the tip observed across the peer
//! pool by running a small pipeline:
//!
//! 1. a header fetch loop requesting missing header ranges from idle peers,
//! 2. a body fetch loop fanning `GetBlockBodies` chunks across idle peers,
//! 3. the [`SyncQueue`], which reassembles headers and bodies into blocks
//!    contiguous with the chain head,
//! 4. a sender-prefetch stage recovering transaction signers off the import
//!    critical path,
//! 5. a single importer feeding [`ember_chain::Chain::try_connect`].
//!
//! Wire handlers deliver peer responses through the ingress methods on
//! [`SyncManager`]; everything else runs on tasks spawned by
//! [`SyncManager::start`].

mod config;
mod error;
mod events;
mod manager;
mod prefetch;
mod queue;
mod wrapper;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use events::{NullEvents, SyncEvents};
pub use manager::{SyncHandle, SyncManager};
pub use queue::{BlocksRequest, HeadersRequest, SyncQueue};
pub use wrapper::{BlockWrapper, HeaderWrapper};

/// Default cap on headers waiting for bodies before the header loop pauses.
pub const HEADER_BACKLOG_CAP: usize = 20_000;

/// Default capacity of the import queue in front of the importer.
pub const IMPORT_QUEUE_CAP: usize = 20_000;

/// Default height window of a single headers request.
pub const HEADER_REQUEST_WINDOW: u64 = 192;

/// Default number of headers considered per body-request cycle.
pub const BODY_REQUEST_BATCH: usize = 1_000;

/// Default number of headers per `GetBlockBodies` sent to a single peer.
pub const BODY_REQUEST_CHUNK: usize = 100;
