//! # ember-network
//!
//! Peer-facing contracts used by the sync engine: the capability interface
//! for dispatching header and body requests ([`PeerHandler`]), the pool
//! interface the fetch loops draw idle peers from ([`PeerPool`]), and a
//! registry implementation with per-kind outstanding-request tracking
//! ([`SyncPeers`]).

mod error;
mod handler;
mod peer;

pub use error::{NetworkError, NetworkResult};
pub use handler::{BlockId, PeerHandler, RequestKind};
pub use peer::{PeerId, PeerPool, SyncPeers};
