//! Block type and deterministic genesis.
//!
//! The block hash is the SHA-256 of the canonical encoding of
//! `(height, prev_hash, concatenated tx ids in order, timestamp,
//! proposer_id)` - header fields only, never a signature, so every node
//! recomputes the identical digest for the same block.

use crate::{codec, Error, Result, Transaction, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Proposer identifier carried by the genesis block.
pub const GENESIS_PROPOSER: &str = "genesis";

/// Canonical preimage hashed into `block_hash`. Field order is the hash
/// contract; do not reorder.
#[derive(Serialize)]
struct BlockPreimage<'a> {
    height: u64,
    prev_hash: H256,
    tx_ids: String,
    timestamp: f64,
    proposer_id: &'a str,
}

/// A committed or proposed block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain (genesis is 0)
    pub height: u64,
    /// Hash of the parent block (all-zero for genesis)
    pub prev_hash: H256,
    /// Proposal time, Unix seconds (0.0 for genesis)
    pub timestamp: f64,
    /// Ordered transactions included in this block
    pub tx_list: Vec<Transaction>,
    /// Validator that proposed this block
    pub proposer_id: String,
    /// SHA-256 over the canonical header preimage
    pub block_hash: H256,
}

impl Block {
    /// Creates a block, deriving its hash from the header fields.
    pub fn new(
        height: u64,
        prev_hash: H256,
        timestamp: f64,
        tx_list: Vec<Transaction>,
        proposer_id: impl Into<String>,
    ) -> Self {
        let proposer_id = proposer_id.into();
        let block_hash = Self::derive_hash(height, &prev_hash, &tx_list, timestamp, &proposer_id);
        Self {
            height,
            prev_hash,
            timestamp,
            tx_list,
            proposer_id,
            block_hash,
        }
    }

    /// The deterministic genesis block. Every node constructs this
    /// identically; a differing genesis hash is a hard startup failure.
    pub fn genesis() -> Self {
        Self::new(0, H256::ZERO, 0.0, Vec::new(), GENESIS_PROPOSER)
    }

    /// Computes the hash for the given header fields.
    pub fn derive_hash(
        height: u64,
        prev_hash: &H256,
        tx_list: &[Transaction],
        timestamp: f64,
        proposer_id: &str,
    ) -> H256 {
        let mut tx_ids = String::with_capacity(tx_list.len() * 64);
        for tx in tx_list {
            tx_ids.push_str(&tx.tx_id.to_hex());
        }
        let preimage = BlockPreimage {
            height,
            prev_hash: *prev_hash,
            tx_ids,
            timestamp,
            proposer_id,
        };
        let bytes = codec::to_canonical_vec(&preimage).expect("block preimage encoding");
        H256::sha256(&bytes)
    }

    /// Recomputes the hash from this block's fields.
    pub fn compute_hash(&self) -> H256 {
        Self::derive_hash(
            self.height,
            &self.prev_hash,
            &self.tx_list,
            self.timestamp,
            &self.proposer_id,
        )
    }

    /// Validates structural rules: the stored hash recomputes, and every
    /// embedded transaction passes its own structural validation.
    pub fn validate_basic(&self) -> Result<()> {
        let computed = self.compute_hash();
        if computed != self.block_hash {
            return Err(Error::BlockHashMismatch {
                height: self.height,
                stored: self.block_hash,
                computed,
            });
        }
        for tx in &self.tx_list {
            tx.validate_basic()?;
        }
        Ok(())
    }

    /// Number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.tx_list.len()
    }

    /// Ids of the included transactions, in order.
    pub fn tx_ids(&self) -> Vec<H256> {
        self.tx_list.iter().map(|tx| tx.tx_id).collect()
    }

    /// Header-only summary for sync responses.
    pub fn header_summary(&self) -> BlockHeaderSummary {
        BlockHeaderSummary {
            height: self.height,
            block_hash: self.block_hash,
            prev_hash: self.prev_hash,
            proposer_id: self.proposer_id.clone(),
            timestamp: self.timestamp,
            tx_count: self.tx_list.len() as u64,
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block #{} (hash: {}, parent: {}, {} txs)",
            self.height,
            self.block_hash.short(),
            self.prev_hash.short(),
            self.tx_list.len()
        )
    }
}

/// Block metadata served in `HEADERS` sync responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeaderSummary {
    /// Block height
    pub height: u64,
    /// Block hash
    pub block_hash: H256,
    /// Parent hash
    pub prev_hash: H256,
    /// Proposing validator
    pub proposer_id: String,
    /// Proposal time, Unix seconds
    pub timestamp: f64,
    /// Number of transactions in the block
    pub tx_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;

    #[test]
    fn genesis_is_deterministic() {
        let a = Block::genesis();
        let b = Block::genesis();
        assert_eq!(a.block_hash, b.block_hash);
        assert_eq!(a.height, 0);
        assert!(a.prev_hash.is_zero());
        assert_eq!(a.timestamp, 0.0);
        assert!(a.tx_list.is_empty());
        assert_eq!(a.proposer_id, GENESIS_PROPOSER);
    }

    #[test]
    fn hash_covers_tx_ids() {
        let genesis = Block::genesis();
        let tx = Transaction::new("alice", "bob", Amount::from_subunits(10), 1.0);
        let with_tx = Block::new(1, genesis.block_hash, 1.5, vec![tx], "b");
        let without = Block::new(1, genesis.block_hash, 1.5, vec![], "b");
        assert_ne!(with_tx.block_hash, without.block_hash);
    }

    #[test]
    fn validate_rejects_tampered_block() {
        let genesis = Block::genesis();
        let mut block = Block::new(1, genesis.block_hash, 1.5, vec![], "b");
        block.proposer_id = "c".into();
        assert!(matches!(
            block.validate_basic(),
            Err(Error::BlockHashMismatch { .. })
        ));
    }
}
