//! chainmesh - a minimal peer-to-peer ledger node.
//!
//! Each node keeps a hash-linked chain of blocks in memory, accepts new
//! blocks from its HTTP control surface and gossips with peers over TCP so
//! that every reachable node converges on the longest valid chain.

pub mod api;
pub mod chain;
pub mod config;
pub mod ledger;
pub mod node;
pub mod sync;
pub mod transport;
