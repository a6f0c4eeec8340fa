//! Capability interface for protocol handlers.

use crate::{NetworkResult, PeerId};
use ember_core::{BlockHeader, H256};

/// Anchor of a headers request: a height or a specific header hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockId {
    /// Request by height.
    Number(u64),
    /// Request by header hash.
    Hash(H256),
}

/// Kind of outstanding request tracked per peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// `GetBlockHeaders` in flight.
    Headers,
    /// `GetBlockBodies` in flight.
    Bodies,
}

/// Wire capabilities the sync engine needs from a connected peer.
///
/// Each supported protocol version implements this interface. Transport
/// failures are the handler's responsibility (it disconnects the peer);
/// the engine only logs the error and moves on to another peer.
pub trait PeerHandler: Send + Sync {
    /// Identity of the remote peer.
    fn peer_id(&self) -> PeerId;

    /// Dispatch a `GetBlockHeaders` request.
    fn send_get_block_headers(
        &self,
        start: BlockId,
        count: u32,
        reverse: bool,
    ) -> NetworkResult<()>;

    /// Dispatch a `GetBlockBodies` request for the given headers.
    fn send_get_block_bodies(&self, headers: &[BlockHeader]) -> NetworkResult<()>;
}
