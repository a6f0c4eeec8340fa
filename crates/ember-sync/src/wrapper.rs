//! Peer-tagged wrappers flowing through the sync pipeline.

use ember_core::{Block, BlockHeader, H256};
use ember_network::PeerId;
use std::time::SystemTime;

/// A header paired with the peer that delivered it.
#[derive(Debug, Clone)]
pub struct HeaderWrapper {
    /// The header.
    pub header: BlockHeader,
    /// Peer the header came from.
    pub node_id: PeerId,
}

impl HeaderWrapper {
    /// Pair a header with its source peer.
    pub fn new(header: BlockHeader, node_id: PeerId) -> Self {
        Self { header, node_id }
    }

    /// Header height.
    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Header hash.
    pub fn hash(&self) -> H256 {
        self.header.hash()
    }
}

/// A block paired with its provenance.
///
/// `is_new_block` distinguishes a block announced as a peer's head from one
/// downloaded during backfill; the first best-import of an announced block
/// marks the node as caught up.
#[derive(Debug, Clone)]
pub struct BlockWrapper {
    /// The assembled block.
    pub block: Block,
    /// Peer the body came from.
    pub node_id: PeerId,
    /// Whether the block was announced as the peer's head.
    pub is_new_block: bool,
    /// Arrival time of an announced block.
    pub received_at: Option<SystemTime>,
}

impl BlockWrapper {
    /// Wrapper for a backfilled block.
    pub fn backfill(block: Block, node_id: PeerId) -> Self {
        Self {
            block,
            node_id,
            is_new_block: false,
            received_at: None,
        }
    }

    /// Wrapper for a peer-announced head block, stamped with arrival time.
    pub fn announced(block: Block, node_id: PeerId) -> Self {
        Self {
            block,
            node_id,
            is_new_block: true,
            received_at: Some(SystemTime::now()),
        }
    }

    /// Block height.
    pub fn number(&self) -> u64 {
        self.block.number()
    }
}
