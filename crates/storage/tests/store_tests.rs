//! Tests for the chain store

use minichain_storage::{ChainStore, StorageError, CHAIN_FILE};
use minichain_types::{Amount, Block, Transaction};
use tempfile::TempDir;

fn validators() -> Vec<String> {
    vec!["a".to_string(), "b".to_string(), "c".to_string()]
}

fn open(dir: &TempDir) -> ChainStore {
    ChainStore::load_or_init(dir.path(), validators()).unwrap()
}

/// Leader(1) over {a, b, c} is b (1 mod 3).
fn next_block(store: &ChainStore, txs: Vec<Transaction>) -> Block {
    let tip = store.tip();
    let height = tip.height + 1;
    let proposer = validators()[(height % 3) as usize].clone();
    Block::new(height, tip.block_hash, height as f64, txs, proposer)
}

#[test]
fn test_init_creates_genesis_chain() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    assert_eq!(store.height(), 0);
    assert_eq!(store.tip(), Block::genesis());
    assert!(dir.path().join(CHAIN_FILE).exists());
}

#[test]
fn test_add_block_advances_tip() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let tx = Transaction::new("alice", "bob", Amount::from_subunits(10), 1.0);
    let block = next_block(&store, vec![tx]);
    store.add_block(block.clone()).unwrap();

    assert_eq!(store.height(), 1);
    assert_eq!(store.tip(), block);
    assert_eq!(store.get_block(1), Some(block));
    assert_eq!(store.get_block(2), None);
}

#[test]
fn test_add_block_is_not_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let block = next_block(&store, vec![]);
    store.add_block(block.clone()).unwrap();

    // Re-adding the tip block fails the height check and changes nothing.
    let before = store.tip();
    assert!(matches!(
        store.add_block(block),
        Err(StorageError::HeightMismatch { expected: 2, actual: 1 })
    ));
    assert_eq!(store.tip(), before);
    assert_eq!(store.height(), 1);
}

#[test]
fn test_rejects_wrong_parent() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let orphan = Block::new(1, Block::genesis().compute_hash(), 1.0, vec![], "b");
    store.add_block(orphan).unwrap(); // sanity: genesis hash is the real parent

    let bad = Block::new(2, Block::genesis().block_hash, 2.0, vec![], "c");
    assert!(matches!(
        store.add_block(bad),
        Err(StorageError::ParentHashMismatch { height: 2, .. })
    ));
    assert_eq!(store.height(), 1);
}

#[test]
fn test_rejects_wrong_proposer() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    // Leader(1) is b; a block claiming a is forged.
    let tip = store.tip();
    let forged = Block::new(1, tip.block_hash, 1.0, vec![], "a");
    assert!(matches!(
        store.add_block(forged),
        Err(StorageError::WrongProposer { height: 1, .. })
    ));
    assert_eq!(store.height(), 0);
}

#[test]
fn test_rejects_tampered_hash() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);

    let mut block = next_block(&store, vec![]);
    block.timestamp = 99.0; // hash no longer recomputes
    assert!(matches!(
        store.add_block(block),
        Err(StorageError::InvalidBlock(_))
    ));
    assert_eq!(store.height(), 0);
}

#[test]
fn test_restart_recovers_identical_chain() {
    let dir = TempDir::new().unwrap();
    let tip = {
        let store = open(&dir);
        let tx = Transaction::new("alice", "bob", Amount::from_subunits(10), 1.0);
        store.add_block(next_block(&store, vec![tx])).unwrap();
        store.add_block(next_block(&store, vec![])).unwrap();
        store.tip()
    };

    // Reopen from disk: the add_block fsync is the last durable step, so
    // a crash immediately after it must recover the same tip.
    let reopened = open(&dir);
    assert_eq!(reopened.height(), 2);
    assert_eq!(reopened.tip(), tip);
}

#[test]
fn test_refuses_foreign_genesis() {
    let dir = TempDir::new().unwrap();

    // Persist a chain whose genesis was built with a different proposer.
    let foreign = Block::new(0, minichain_types::H256::ZERO, 0.0, vec![], "not-genesis");
    let doc = serde_json::json!({ "blocks": [foreign] });
    std::fs::write(
        dir.path().join(CHAIN_FILE),
        serde_json::to_vec(&doc).unwrap(),
    )
    .unwrap();

    assert!(matches!(
        ChainStore::load_or_init(dir.path(), validators()),
        Err(StorageError::GenesisMismatch { .. })
    ));
}

#[test]
fn test_load_rejects_corrupt_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(CHAIN_FILE), b"{ not json").unwrap();
    assert!(matches!(
        ChainStore::load_or_init(dir.path(), validators()),
        Err(StorageError::Corrupt(_))
    ));
}

#[test]
fn test_get_blocks_range() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.add_block(next_block(&store, vec![])).unwrap();
    store.add_block(next_block(&store, vec![])).unwrap();

    let range = store.get_blocks(1, 2);
    assert_eq!(range.len(), 2);
    assert_eq!(range[0].height, 1);
    assert_eq!(range[1].height, 2);

    // Range clamps to the tip and empties cleanly.
    assert_eq!(store.get_blocks(1, 99).len(), 2);
    assert!(store.get_blocks(5, 9).is_empty());
}
