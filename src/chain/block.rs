// Block - The immutable unit of the chain
//
// A block's hash is a pure function of its other four fields:
// SHA-256 over index ++ timestamp ++ data ++ previous_hash, hex encoded.
// Timestamps are any JSON number; peers may stamp fractional seconds.

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

/// Timestamp of the genesis block (epoch seconds)
pub const GENESIS_TIMESTAMP: u64 = 1_521_013_323;

/// Payload carried by the genesis block
pub const GENESIS_DATA: &str = "Genesis block";

/// Previous-hash marker used by the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// A single block in the chain
///
/// Fields are private: a block is immutable once built. Use [`Block::new`]
/// to build a correctly hashed block, or [`Block::from_parts`] to take one
/// exactly as a peer sent it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    index: u64,
    timestamp: Number,
    data: Value,
    hash: String,
    previous_hash: String,
}

impl Block {
    /// Build a block and compute its hash
    pub fn new(
        index: u64,
        timestamp: impl Into<Number>,
        data: Value,
        previous_hash: impl Into<String>,
    ) -> Self {
        let timestamp = timestamp.into();
        let previous_hash = previous_hash.into();
        let hash = Self::calculate_hash(index, &timestamp, &data, &previous_hash);

        Self {
            index,
            timestamp,
            data,
            hash,
            previous_hash,
        }
    }

    /// Assemble a block from raw fields without recomputing the hash
    pub fn from_parts(
        index: u64,
        timestamp: impl Into<Number>,
        data: Value,
        hash: impl Into<String>,
        previous_hash: impl Into<String>,
    ) -> Self {
        Self {
            index,
            timestamp: timestamp.into(),
            data,
            hash: hash.into(),
            previous_hash: previous_hash.into(),
        }
    }

    /// The well-known first block of every valid chain
    pub fn genesis() -> Self {
        Self::new(
            0,
            GENESIS_TIMESTAMP,
            Value::String(GENESIS_DATA.to_string()),
            GENESIS_PREVIOUS_HASH,
        )
    }

    /// Build the block that follows `previous`, stamped with the current time
    pub fn next(previous: &Block, data: Value) -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Self::next_with_timestamp(previous, now, data)
    }

    /// Build the block that follows `previous` with an explicit timestamp
    pub fn next_with_timestamp(previous: &Block, timestamp: impl Into<Number>, data: Value) -> Self {
        Self::new(previous.index + 1, timestamp, data, previous.hash.clone())
    }

    /// Compute the digest for a set of block fields
    ///
    /// The timestamp contributes its canonical decimal text (see
    /// [`canonical_number`]). String payloads contribute their raw text; any
    /// other JSON value contributes its compact serialization.
    pub fn calculate_hash(index: u64, timestamp: &Number, data: &Value, previous_hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(index.to_string().as_bytes());
        hasher.update(canonical_number(timestamp).as_bytes());
        match data {
            Value::String(s) => hasher.update(s.as_bytes()),
            other => hasher.update(other.to_string().as_bytes()),
        }
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Recompute this block's digest from its fields
    pub fn compute_hash(&self) -> String {
        Self::calculate_hash(self.index, &self.timestamp, &self.data, &self.previous_hash)
    }

    /// Whether the stored hash matches the recomputed digest
    pub fn has_valid_hash(&self) -> bool {
        self.compute_hash() == self.hash
    }

    /// Whether this block is byte-identical to the genesis block
    pub fn is_genesis(&self) -> bool {
        *self == Self::genesis()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn timestamp(&self) -> Number {
        self.timestamp.clone()
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }
}

/// Decimal text of a JSON number as it enters the digest
///
/// Integers render as-is. Floats with no fractional part render without a
/// trailing `.0`, so `5` and `5.0` hash alike.
pub fn canonical_number(number: &Number) -> String {
    if number.is_f64() {
        if let Some(f) = number.as_f64() {
            if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
                return (f as i64).to_string();
            }
        }
    }
    number.to_string()
}
