//! In-memory chain backing tests and the demo node.

use crate::{Chain, ChainResult, ImportResult};
use ember_core::{Block, BlockHeader, H256, U256};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

struct Inner {
    blocks: HashMap<H256, Block>,
    total_difficulty: HashMap<H256, U256>,
    head: H256,
}

/// Minimal in-memory chain with total-difficulty best-block selection.
///
/// Keeps every imported block; suitable for tests and short-lived demo runs,
/// not for real sync targets.
pub struct MemoryChain {
    inner: RwLock<Inner>,
}

impl MemoryChain {
    /// Create a chain rooted at the given genesis block.
    pub fn new(genesis: Block) -> Self {
        let hash = genesis.hash();
        let mut blocks = HashMap::new();
        let mut total_difficulty = HashMap::new();
        total_difficulty.insert(hash, genesis.header.difficulty);
        blocks.insert(hash, genesis);
        Self {
            inner: RwLock::new(Inner {
                blocks,
                total_difficulty,
                head: hash,
            }),
        }
    }

    /// Height of the current best block.
    pub fn head_number(&self) -> u64 {
        let inner = self.inner.read();
        inner.blocks[&inner.head].number()
    }

    /// Whether a block with this hash has been imported.
    pub fn contains(&self, hash: &H256) -> bool {
        self.inner.read().blocks.contains_key(hash)
    }

    /// Fetch an imported block by hash.
    pub fn block(&self, hash: &H256) -> Option<Block> {
        self.inner.read().blocks.get(hash).cloned()
    }

    /// Number of imported blocks, genesis included.
    pub fn len(&self) -> usize {
        self.inner.read().blocks.len()
    }

    /// Never true: the genesis block is always present.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Chain for MemoryChain {
    fn head(&self) -> BlockHeader {
        let inner = self.inner.read();
        inner.blocks[&inner.head].header.clone()
    }

    fn try_connect(&self, block: &Block) -> ChainResult<ImportResult> {
        let mut inner = self.inner.write();
        let hash = block.hash();
        if inner.blocks.contains_key(&hash) {
            return Ok(ImportResult::Exists);
        }

        let parent_hash = block.parent_hash();
        let Some(parent_td) = inner.total_difficulty.get(&parent_hash).copied() else {
            return Ok(ImportResult::NoParent);
        };
        let parent_number = inner.blocks[&parent_hash].number();
        if block.number() != parent_number + 1 {
            debug!(
                number = block.number(),
                parent_number, "Rejecting block with inconsistent height"
            );
            return Ok(ImportResult::Invalid);
        }

        let td = parent_td + block.header.difficulty;
        inner.total_difficulty.insert(hash, td);
        inner.blocks.insert(hash, block.clone());

        let best_td = inner.total_difficulty[&inner.head];
        if td > best_td {
            inner.head = hash;
            Ok(ImportResult::ImportedBest)
        } else {
            Ok(ImportResult::ImportedNotBest)
        }
    }
}
