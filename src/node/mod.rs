// Node module - THE LOOP
// Wires the gossip engine to a transport and exposes a command handle

mod runtime;

pub use runtime::{Node, NodeCommand, NodeError, NodeHandle};
