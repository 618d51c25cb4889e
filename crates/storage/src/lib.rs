//! # MiniChain Chain Store
//!
//! Ordered sequence of committed blocks with crash-safe persistence.
//!
//! The store accepts only the unique next block at `height + 1` - there
//! is no fork buffer. Every accepted block is validated against the
//! chain invariants before anything is mutated, then the full chain is
//! written to `<data_dir>/chain.json` via temp file + fsync + atomic
//! rename, so a crash at any point leaves either the old or the new
//! chain on disk, never a torn write.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod store;

pub use store::{ChainStore, CHAIN_FILE};

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in chain store operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Block height is not exactly tip + 1
    #[error("height mismatch: expected {expected}, got {actual}")]
    HeightMismatch {
        /// The only acceptable next height
        expected: u64,
        /// Height carried by the rejected block
        actual: u64,
    },

    /// Block does not link to the current tip
    #[error("parent hash mismatch at height {height}: expected {expected}, got {actual}")]
    ParentHashMismatch {
        /// Height of the rejected block
        height: u64,
        /// Hash of the current tip
        expected: minichain_types::H256,
        /// prev_hash carried by the rejected block
        actual: minichain_types::H256,
    },

    /// Block proposer is not the round-robin leader for its height
    #[error("wrong proposer at height {height}: expected {expected}, got {actual}")]
    WrongProposer {
        /// Height of the rejected block
        height: u64,
        /// Leader the rotation selects for this height
        expected: String,
        /// Proposer carried by the rejected block
        actual: String,
    },

    /// Block failed structural validation (hash or embedded transaction)
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] minichain_types::Error),

    /// Persisted genesis does not match the deterministic genesis;
    /// refusing to start
    #[error("genesis mismatch: on-disk {on_disk}, expected {expected}")]
    GenesisMismatch {
        /// Hash of the persisted genesis block
        on_disk: minichain_types::H256,
        /// Hash every node must agree on
        expected: minichain_types::H256,
    },

    /// Persisted chain file could not be parsed
    #[error("corrupt chain file: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Filesystem failure; fatal when it happens during commit
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
