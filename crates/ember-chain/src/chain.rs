//! Chain import contract.

use crate::ChainResult;
use ember_core::{Block, BlockHeader};

/// Outcome of attempting to connect a block to the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportResult {
    /// Imported and became the new best block.
    ImportedBest,
    /// Imported onto a non-canonical branch.
    ImportedNotBest,
    /// Already known, nothing done.
    Exists,
    /// Parent is unknown; the block cannot be connected yet.
    NoParent,
    /// Failed consensus checks.
    Invalid,
}

/// The local canonical chain as seen by the sync engine.
///
/// `head` must be queryable for the whole lifetime of the engine; callers
/// construct the engine only after the chain subsystem has initialized.
/// `try_connect` may block on storage I/O, so it is only ever called from
/// the dedicated importer thread.
pub trait Chain: Send + Sync {
    /// Header of the current best block.
    fn head(&self) -> BlockHeader;

    /// Try to connect a block to the chain.
    fn try_connect(&self, block: &Block) -> ChainResult<ImportResult>;
}
