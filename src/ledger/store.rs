// Ledger Store - The local copy of the chain
//
// Single owner of chain state. The only mutations are `append` (one block
// at the tail) and `replace` (swap in a strictly longer valid chain); both
// either fully succeed or leave the ledger untouched.

use crate::chain::{Block, ChainValidator, ValidationError};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur during ledger mutations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Block rejected: {0}")]
    InvalidBlock(ValidationError),

    #[error("Chain rejected: {0}")]
    InvalidChain(ValidationError),

    #[error("Chain rejected: length {received} is not longer than local length {local}")]
    NotLonger { local: usize, received: usize },
}

/// In-memory ordered sequence of blocks, always starting at genesis
#[derive(Clone, Debug)]
pub struct Ledger {
    blocks: Vec<Block>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Create a ledger holding only the genesis block
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::genesis()],
        }
    }

    /// Get the tail block
    pub fn latest(&self) -> &Block {
        // Invariant: never empty, genesis is always present
        &self.blocks[self.blocks.len() - 1]
    }

    /// Get all blocks in index order
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Get a block by index
    pub fn get(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.blocks.get(i))
    }

    /// Number of blocks, genesis included
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false: the genesis block is always present
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Build the block that would follow the current tail
    pub fn generate_next_block(&self, data: Value) -> Block {
        Block::next(self.latest(), data)
    }

    /// Append a block that directly extends the tail
    pub fn append(&mut self, candidate: Block) -> Result<(), LedgerError> {
        if let Err(e) = ChainValidator::validate_link(&candidate, self.latest()) {
            debug!(index = candidate.index(), error = %e, "append rejected");
            return Err(LedgerError::InvalidBlock(e));
        }

        info!(index = candidate.index(), hash = candidate.hash(), "block appended");
        self.blocks.push(candidate);
        Ok(())
    }

    /// Swap the whole chain for a strictly longer valid one
    ///
    /// Equal length keeps the local chain, even if the candidate differs.
    pub fn replace(&mut self, candidates: Vec<Block>) -> Result<(), LedgerError> {
        if let Err(e) = ChainValidator::validate_chain(&candidates) {
            debug!(length = candidates.len(), error = %e, "replace rejected: invalid chain");
            return Err(LedgerError::InvalidChain(e));
        }

        if candidates.len() <= self.blocks.len() {
            debug!(
                local = self.blocks.len(),
                received = candidates.len(),
                "replace rejected: not longer"
            );
            return Err(LedgerError::NotLonger {
                local: self.blocks.len(),
                received: candidates.len(),
            });
        }

        info!(
            from = self.blocks.len(),
            to = candidates.len(),
            "replacing local chain with longer valid chain"
        );
        self.blocks = candidates;
        Ok(())
    }
}
