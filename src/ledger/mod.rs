// Ledger module - THE SHARED HISTORY
// Owns the local chain and reconciles it with chains received from peers

mod conflict;
mod store;

pub use conflict::{ConflictResolver, Resolution};
pub use store::{Ledger, LedgerError};
