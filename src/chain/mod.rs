// Chain module - THE BLOCKS
// Block model, hashing, genesis definition and link/chain validation

mod block;
mod validator;

pub use block::{canonical_number, Block, GENESIS_DATA, GENESIS_PREVIOUS_HASH, GENESIS_TIMESTAMP};
pub use validator::{ChainValidator, ValidationError};
