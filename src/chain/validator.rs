use crate::chain::Block;
use thiserror::Error;

/// Reasons a block or chain fails validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid index: expected {expected}, found {found}")]
    InvalidIndex { expected: u64, found: u64 },

    #[error("Invalid previous hash at index {index}: expected {expected}, found {found}")]
    PreviousHashMismatch {
        index: u64,
        expected: String,
        found: String,
    },

    #[error("Invalid hash at index {index}: computed {computed}, stored {stored}")]
    HashMismatch {
        index: u64,
        computed: String,
        stored: String,
    },

    #[error("Empty chain: a chain must contain at least the genesis block")]
    EmptyChain,

    #[error("Genesis mismatch: first block is not the genesis block")]
    GenesisMismatch,
}

/// Validator for block links and whole chains
pub struct ChainValidator;

impl ChainValidator {
    /// Check that `candidate` may directly follow `previous`
    ///
    /// This performs, in order:
    /// - Index continuity check
    /// - Previous-hash link check
    /// - Self-hash recomputation
    pub fn validate_link(candidate: &Block, previous: &Block) -> Result<(), ValidationError> {
        let expected_index = previous.index() + 1;
        if candidate.index() != expected_index {
            return Err(ValidationError::InvalidIndex {
                expected: expected_index,
                found: candidate.index(),
            });
        }

        if candidate.previous_hash() != previous.hash() {
            return Err(ValidationError::PreviousHashMismatch {
                index: candidate.index(),
                expected: previous.hash().to_string(),
                found: candidate.previous_hash().to_string(),
            });
        }

        let computed = candidate.compute_hash();
        if computed != candidate.hash() {
            return Err(ValidationError::HashMismatch {
                index: candidate.index(),
                computed,
                stored: candidate.hash().to_string(),
            });
        }

        Ok(())
    }

    /// Check a whole chain from genesis to tip
    ///
    /// Stops at the first failing link.
    pub fn validate_chain(blocks: &[Block]) -> Result<(), ValidationError> {
        let first = blocks.first().ok_or(ValidationError::EmptyChain)?;
        if !first.is_genesis() {
            return Err(ValidationError::GenesisMismatch);
        }

        for pair in blocks.windows(2) {
            Self::validate_link(&pair[1], &pair[0])?;
        }

        Ok(())
    }

    /// Boolean form of [`ChainValidator::validate_link`]
    pub fn is_valid_link(candidate: &Block, previous: &Block) -> bool {
        Self::validate_link(candidate, previous).is_ok()
    }

    /// Boolean form of [`ChainValidator::validate_chain`]
    pub fn is_valid_chain(blocks: &[Block]) -> bool {
        Self::validate_chain(blocks).is_ok()
    }
}
