// Gossip Engine - The heart of chain synchronization
//
// A pure state machine over the ledger. It decodes frames, answers queries,
// drives conflict resolution and reports what should go out on the wire as
// events. It performs no I/O itself; the node runtime does that.

use crate::chain::Block;
use crate::ledger::{ConflictResolver, Ledger, LedgerError, Resolution};
use crate::sync::protocol::{Message, ProtocolError};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

/// Gossip-related errors
#[derive(Error, Debug)]
pub enum GossipError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Block rejected: {0}")]
    BlockRejected(#[from] LedgerError),
}

/// Events produced by the gossip engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GossipEvent {
    /// Send a message back to the peer the input came from
    Reply(Message),
    /// Send a message to every connected peer
    Broadcast(Message),
    /// A block was appended to the local chain
    BlockAppended(Block),
    /// The local chain was replaced by a longer one
    ChainReplaced { previous_length: usize, new_length: usize },
}

/// Statistics about the gossip engine
#[derive(Clone, Debug, Default)]
pub struct GossipStats {
    pub messages_processed: u64,
    pub malformed_frames: u64,
    pub blocks_mined: u64,
    pub blocks_appended: u64,
    pub chains_replaced: u64,
    pub fragments_rejected: u64,
    pub chain_queries: u64,
}

/// The gossip engine - orchestrates chain synchronization
pub struct GossipEngine {
    /// The ledger we're synchronizing
    ledger: Ledger,
    /// Statistics
    stats: GossipStats,
}

impl Default for GossipEngine {
    fn default() -> Self {
        Self::new(Ledger::new())
    }
}

impl GossipEngine {
    /// Create a new gossip engine around a ledger
    pub fn new(ledger: Ledger) -> Self {
        Self {
            ledger,
            stats: GossipStats::default(),
        }
    }

    /// Get the ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Get statistics
    pub fn stats(&self) -> &GossipStats {
        &self.stats
    }

    /// Message to send to a freshly connected peer
    pub fn on_peer_connected(&self) -> Message {
        Message::QueryLatestBlock
    }

    /// Message announcing our current tip
    pub fn latest_block_message(&self) -> Message {
        Message::response_latest(self.ledger.latest())
    }

    // ========================================================================
    // LOCAL BLOCKS
    // ========================================================================

    /// Create the next block from local data and append it
    ///
    /// The caller is expected to broadcast [`GossipEngine::latest_block_message`].
    pub fn submit_block_data(&mut self, data: Value) -> Result<Block, GossipError> {
        let block = self.ledger.generate_next_block(data);
        self.ledger.append(block.clone())?;
        self.stats.blocks_mined += 1;
        Ok(block)
    }

    // ========================================================================
    // MESSAGE PROCESSING
    // ========================================================================

    /// Decode and process an incoming text frame
    ///
    /// A decode failure is returned as an error and leaves all state as is.
    pub fn process_frame(&mut self, frame: &str) -> Result<Vec<GossipEvent>, GossipError> {
        let msg = match Message::decode(frame) {
            Ok(msg) => msg,
            Err(e) => {
                self.stats.malformed_frames += 1;
                return Err(e.into());
            }
        };
        Ok(self.process_message(msg))
    }

    /// Process an incoming message
    pub fn process_message(&mut self, msg: Message) -> Vec<GossipEvent> {
        self.stats.messages_processed += 1;
        debug!(message_type = ?msg.message_type(), "processing message");

        match msg {
            Message::QueryLatestBlock => vec![GossipEvent::Reply(self.latest_block_message())],
            Message::QueryBlockchain => vec![GossipEvent::Reply(Message::response_chain(
                self.ledger.blocks(),
            ))],
            Message::ResponseBlockchain(blocks) => self.handle_blockchain_response(blocks),
        }
    }

    fn handle_blockchain_response(&mut self, blocks: Vec<Block>) -> Vec<GossipEvent> {
        match ConflictResolver::resolve(&mut self.ledger, blocks) {
            Resolution::Appended(block) => {
                self.stats.blocks_appended += 1;
                vec![
                    GossipEvent::BlockAppended(block),
                    GossipEvent::Broadcast(self.latest_block_message()),
                ]
            }
            Resolution::Replaced {
                previous_length,
                new_length,
            } => {
                self.stats.chains_replaced += 1;
                info!(previous_length, new_length, "adopted longer chain from peer");
                vec![
                    GossipEvent::ChainReplaced {
                        previous_length,
                        new_length,
                    },
                    GossipEvent::Broadcast(self.latest_block_message()),
                ]
            }
            Resolution::QueryChain { .. } => {
                self.stats.chain_queries += 1;
                vec![GossipEvent::Broadcast(Message::QueryBlockchain)]
            }
            Resolution::AppendRejected(_) | Resolution::ReplaceRejected(_) => {
                self.stats.fragments_rejected += 1;
                vec![]
            }
            Resolution::UpToDate { .. } | Resolution::Empty => vec![],
        }
    }
}
