// Conflict Resolution Tests
// Tests for the graduated response to chains received from peers

use chainmesh::chain::Block;
use chainmesh::ledger::{ConflictResolver, Ledger, LedgerError, Resolution};
use serde_json::json;

fn extend(chain: &[Block], count: usize, tag: &str) -> Vec<Block> {
    let mut blocks = chain.to_vec();
    for i in 0..count {
        let tip = blocks.last().unwrap();
        let next = Block::next_with_timestamp(tip, 1_650_000_000 + i as u64, json!(format!("{} {}", tag, i)));
        blocks.push(next);
    }
    blocks
}

fn ledger_from(blocks: &[Block]) -> Ledger {
    let mut ledger = Ledger::new();
    ledger.replace(blocks.to_vec()).unwrap();
    ledger
}

// ============================================================================
// NOT AHEAD
// ============================================================================

#[test]
fn test_empty_fragment_ignored() {
    let mut ledger = Ledger::new();

    assert_eq!(ConflictResolver::resolve(&mut ledger, vec![]), Resolution::Empty);
    assert_eq!(ledger.len(), 1);
}

#[test]
fn test_identical_chain_is_up_to_date() {
    let chain = extend(&[Block::genesis()], 3, "a");
    let mut ledger = ledger_from(&chain);

    let resolution = ConflictResolver::resolve(&mut ledger, chain.clone());

    assert_eq!(
        resolution,
        Resolution::UpToDate { local_index: 3, received_index: 3 }
    );
    assert!(!resolution.changed_ledger());
    assert_eq!(ledger.blocks(), chain.as_slice());
}

#[test]
fn test_older_tip_is_up_to_date() {
    let chain = extend(&[Block::genesis()], 4, "a");
    let mut ledger = ledger_from(&chain);

    let resolution = ConflictResolver::resolve(&mut ledger, vec![chain[2].clone()]);

    assert!(matches!(resolution, Resolution::UpToDate { .. }));
    assert_eq!(ledger.len(), 5);
}

#[test]
fn test_equal_length_competing_chain_keeps_incumbent() {
    let ours = extend(&[Block::genesis()], 3, "ours");
    let theirs = extend(&[Block::genesis()], 3, "theirs");
    let mut ledger = ledger_from(&ours);

    let resolution = ConflictResolver::resolve(&mut ledger, theirs);

    assert!(matches!(resolution, Resolution::UpToDate { .. }));
    assert_eq!(ledger.blocks(), ours.as_slice());
}

// ============================================================================
// SINGLE BLOCK
// ============================================================================

#[test]
fn test_single_block_fast_path_appends() {
    let chain = extend(&[Block::genesis()], 2, "a");
    let mut ledger = ledger_from(&chain);
    let next = Block::next_with_timestamp(ledger.latest(), 42, json!("tip"));

    let resolution = ConflictResolver::resolve(&mut ledger, vec![next.clone()]);

    assert_eq!(resolution, Resolution::Appended(next.clone()));
    assert!(resolution.changed_ledger());
    assert_eq!(ledger.len(), 4);
    assert_eq!(ledger.latest(), &next);
}

#[test]
fn test_single_block_linking_but_forged_is_rejected() {
    let mut ledger = Ledger::new();
    let genesis = ledger.latest().clone();
    let forged = Block::from_parts(1, 42, json!("tip"), "b".repeat(64), genesis.hash());

    let resolution = ConflictResolver::resolve(&mut ledger, vec![forged]);

    assert!(matches!(
        resolution,
        Resolution::AppendRejected(LedgerError::InvalidBlock(_))
    ));
    assert_eq!(ledger.len(), 1);
}

#[test]
fn test_single_block_far_ahead_queries_chain() {
    let remote = extend(&[Block::genesis()], 5, "remote");
    let mut ledger = ledger_from(&remote[..2]);

    let resolution = ConflictResolver::resolve(&mut ledger, vec![remote[5].clone()]);

    assert_eq!(
        resolution,
        Resolution::QueryChain { local_index: 1, received_index: 5 }
    );
    assert_eq!(ledger.len(), 2);
}

#[test]
fn test_single_block_on_a_fork_queries_chain() {
    let ours = extend(&[Block::genesis()], 2, "ours");
    let theirs = extend(&[Block::genesis()], 3, "theirs");
    let mut ledger = ledger_from(&ours);

    let resolution = ConflictResolver::resolve(&mut ledger, vec![theirs[3].clone()]);

    assert!(matches!(resolution, Resolution::QueryChain { .. }));
    assert_eq!(ledger.blocks(), ours.as_slice());
}

// ============================================================================
// MULTI BLOCK
// ============================================================================

#[test]
fn test_longer_chain_replaces() {
    let ours = extend(&[Block::genesis()], 2, "shared");
    let theirs = extend(&ours, 2, "theirs");
    let mut ledger = ledger_from(&ours);

    let resolution = ConflictResolver::resolve(&mut ledger, theirs.clone());

    assert_eq!(
        resolution,
        Resolution::Replaced { previous_length: 3, new_length: 5 }
    );
    assert_eq!(ledger.blocks(), theirs.as_slice());
}

#[test]
fn test_unsorted_chain_is_sorted_before_inspection() {
    let ours = extend(&[Block::genesis()], 1, "shared");
    let theirs = extend(&ours, 3, "theirs");
    let mut shuffled = theirs.clone();
    shuffled.reverse();
    let mut ledger = ledger_from(&ours);

    let resolution = ConflictResolver::resolve(&mut ledger, shuffled);

    assert!(matches!(resolution, Resolution::Replaced { .. }));
    assert_eq!(ledger.blocks(), theirs.as_slice());
}

#[test]
fn test_longer_invalid_chain_dropped() {
    let ours = extend(&[Block::genesis()], 1, "shared");
    let mut theirs = extend(&ours, 3, "theirs");
    let b = theirs[2].clone();
    theirs[2] = Block::from_parts(b.index(), b.timestamp(), json!("forged"), b.hash(), b.previous_hash());
    let mut ledger = ledger_from(&ours);

    let resolution = ConflictResolver::resolve(&mut ledger, theirs);

    assert!(matches!(
        resolution,
        Resolution::ReplaceRejected(LedgerError::InvalidChain(_))
    ));
    assert_eq!(ledger.blocks(), ours.as_slice());
}

#[test]
fn test_partial_fragment_without_genesis_dropped() {
    let ours = extend(&[Block::genesis()], 1, "shared");
    let theirs = extend(&ours, 3, "theirs");
    let mut ledger = ledger_from(&ours);

    // Ahead, but not a full chain from genesis
    let resolution = ConflictResolver::resolve(&mut ledger, theirs[2..].to_vec());

    assert!(matches!(resolution, Resolution::ReplaceRejected(_)));
    assert_eq!(ledger.len(), 2);
}
