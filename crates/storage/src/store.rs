//! Chain store implementation.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use minichain_types::{Block, H256};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{Result, StorageError};

/// File name of the persisted chain document inside the data directory.
pub const CHAIN_FILE: &str = "chain.json";

/// On-disk chain document: `{ "blocks": [ Block... ] }`.
#[derive(Serialize, Deserialize)]
struct ChainDocument {
    blocks: Vec<Block>,
}

/// Durable, validated sequence of committed blocks.
pub struct ChainStore {
    path: PathBuf,
    /// Sorted validator identifiers, for the proposer-rotation check
    validators: Vec<String>,
    chain: RwLock<Vec<Block>>,
}

impl ChainStore {
    /// Opens the chain at `<data_dir>/chain.json`, re-validating every
    /// persisted block, or initializes a fresh chain containing genesis.
    ///
    /// A persisted genesis that differs from the deterministic genesis
    /// is a hard failure: the node must not start on a foreign chain.
    pub fn load_or_init(data_dir: &Path, validators: Vec<String>) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let path = data_dir.join(CHAIN_FILE);

        let store = Self {
            path,
            validators,
            chain: RwLock::new(Vec::new()),
        };

        if store.path.exists() {
            let raw = fs::read(&store.path)?;
            let doc: ChainDocument = serde_json::from_slice(&raw)?;
            store.validate_full_chain(&doc.blocks)?;
            info!(
                height = doc.blocks.len() as u64 - 1,
                path = %store.path.display(),
                "loaded chain"
            );
            *store.chain.write() = doc.blocks;
        } else {
            let genesis = Block::genesis();
            info!(genesis_hash = %genesis.block_hash, "initializing new chain");
            let blocks = vec![genesis];
            store.persist(&blocks)?;
            *store.chain.write() = blocks;
        }

        Ok(store)
    }

    /// Height of the tip (genesis = 0).
    pub fn height(&self) -> u64 {
        self.chain.read().len() as u64 - 1
    }

    /// The highest committed block.
    pub fn tip(&self) -> Block {
        self.chain.read().last().cloned().expect("chain holds genesis")
    }

    /// Block at the given height, if committed.
    pub fn get_block(&self, height: u64) -> Option<Block> {
        self.chain.read().get(height as usize).cloned()
    }

    /// Blocks in the inclusive height range, clamped to the tip.
    pub fn get_blocks(&self, from_height: u64, to_height: u64) -> Vec<Block> {
        let chain = self.chain.read();
        let from = from_height as usize;
        let to = (to_height as usize).min(chain.len().saturating_sub(1));
        if from > to {
            return Vec::new();
        }
        chain[from..=to].to_vec()
    }

    /// Appends the unique next block.
    ///
    /// Validates height continuity, parent linkage, proposer rotation,
    /// and hash integrity against the current tip; on success the full
    /// chain is durably persisted before this returns. A rejected block
    /// leaves both memory and disk unchanged.
    pub fn add_block(&self, block: Block) -> Result<()> {
        // Validate and stage under the read lock, persist with no lock
        // held (the orchestrator serializes committers), then swap.
        let next = {
            let chain = self.chain.read();
            let tip = chain.last().expect("chain holds genesis");
            self.validate_next(tip, &block)?;
            let mut next = chain.clone();
            next.push(block);
            next
        };

        self.persist(&next)?;

        debug!(
            height = next.len() as u64 - 1,
            block_hash = %next.last().expect("just pushed").block_hash,
            "appended block"
        );
        *self.chain.write() = next;
        Ok(())
    }

    /// Expected round-robin proposer for a height.
    fn expected_proposer(&self, height: u64) -> &str {
        &self.validators[height as usize % self.validators.len()]
    }

    fn validate_next(&self, tip: &Block, block: &Block) -> Result<()> {
        let expected_height = tip.height + 1;
        if block.height != expected_height {
            return Err(StorageError::HeightMismatch {
                expected: expected_height,
                actual: block.height,
            });
        }
        if block.prev_hash != tip.block_hash {
            return Err(StorageError::ParentHashMismatch {
                height: block.height,
                expected: tip.block_hash,
                actual: block.prev_hash,
            });
        }
        let expected_proposer = self.expected_proposer(block.height);
        if block.proposer_id != expected_proposer {
            return Err(StorageError::WrongProposer {
                height: block.height,
                expected: expected_proposer.to_string(),
                actual: block.proposer_id.clone(),
            });
        }
        block.validate_basic()?;
        Ok(())
    }

    /// Re-validates a persisted chain with the same checks as
    /// `add_block`, plus the genesis identity check.
    fn validate_full_chain(&self, blocks: &[Block]) -> Result<()> {
        let expected_genesis = Block::genesis();
        let on_disk = blocks.first().map(|b| b.block_hash).unwrap_or(H256::ZERO);
        if on_disk != expected_genesis.block_hash {
            warn!(
                on_disk = %on_disk,
                expected = %expected_genesis.block_hash,
                "persisted genesis does not match deterministic genesis"
            );
            return Err(StorageError::GenesisMismatch {
                on_disk,
                expected: expected_genesis.block_hash,
            });
        }

        for pair in blocks.windows(2) {
            self.validate_next(&pair[0], &pair[1])?;
        }
        Ok(())
    }

    /// Writes the full chain crash-safely: temp file in the same
    /// directory, fsync, atomic rename over the canonical path.
    fn persist(&self, blocks: &[Block]) -> Result<()> {
        let doc = ChainDocument {
            blocks: blocks.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&doc)?;

        let tmp_path = self.path.with_extension("json.tmp");
        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&bytes)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}
