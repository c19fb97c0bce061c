// Conflict Resolution - Decides what to do with a peer's chain fragment
//
// Graduated response to a RESPONSE_BLOCKCHAIN payload:
// - behind or level: ignore
// - one block that extends our tip: append it
// - one block that doesn't: ask peers for their whole chain
// - several blocks: try to replace our chain with them
//
// Ties always favour the chain we already hold. There is no cost to
// lengthening a chain, so this is not safe against adversarial peers.

use crate::chain::Block;
use crate::ledger::store::{Ledger, LedgerError};
use tracing::{debug, info, warn};

/// Outcome of resolving one received fragment against the ledger
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing received
    Empty,
    /// Received tip is not ahead of ours
    UpToDate { local_index: u64, received_index: u64 },
    /// The single received block extended our tip
    Appended(Block),
    /// The single received block looked like an extension but failed validation
    AppendRejected(LedgerError),
    /// Peer is ahead by more than one block; the full chain is needed
    QueryChain { local_index: u64, received_index: u64 },
    /// Our chain was swapped for the received one
    Replaced { previous_length: usize, new_length: usize },
    /// Received chain was invalid or not longer
    ReplaceRejected(LedgerError),
}

impl Resolution {
    /// Whether the ledger changed and the new tip should be broadcast
    pub fn changed_ledger(&self) -> bool {
        matches!(self, Resolution::Appended(_) | Resolution::Replaced { .. })
    }
}

/// Stateless resolver applying the longest-chain rule
pub struct ConflictResolver;

impl ConflictResolver {
    /// Resolve a received fragment against the ledger, mutating it if warranted
    ///
    /// `received` is sorted by index before inspection.
    pub fn resolve(ledger: &mut Ledger, mut received: Vec<Block>) -> Resolution {
        received.sort_by_key(|b| b.index());

        let received_index = match received.last() {
            Some(tip) => tip.index(),
            None => return Resolution::Empty,
        };
        let local_index = ledger.latest().index();

        if received_index <= local_index {
            debug!(
                ours = local_index,
                peers = received_index,
                "received chain is not longer than ours, ignoring"
            );
            return Resolution::UpToDate {
                local_index,
                received_index,
            };
        }

        info!(
            ours = local_index,
            peers = received_index,
            "chain is possibly behind"
        );

        if received.len() == 1 {
            let tip = received.remove(0);

            if tip.previous_hash() == ledger.latest().hash() {
                return match ledger.append(tip.clone()) {
                    Ok(()) => Resolution::Appended(tip),
                    Err(e) => {
                        warn!(error = %e, "received block links to our tip but is invalid");
                        Resolution::AppendRejected(e)
                    }
                };
            }

            info!("received a lone tip that does not extend ours, querying full chain");
            return Resolution::QueryChain {
                local_index,
                received_index,
            };
        }

        let previous_length = ledger.len();
        match ledger.replace(received) {
            Ok(()) => Resolution::Replaced {
                previous_length,
                new_length: ledger.len(),
            },
            Err(e) => {
                warn!(error = %e, "received chain rejected");
                Resolution::ReplaceRejected(e)
            }
        }
    }
}
