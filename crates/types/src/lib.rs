//! # MiniChain Types
//!
//! Core data types shared by every MiniChain crate:
//! - [`H256`] - 32-byte SHA-256 hash rendered as lowercase 64-hex
//! - [`Amount`] - transfer value in integer subunits
//! - [`Transaction`] - a signed-identity value transfer
//! - [`Block`] - an ordered batch of transactions with a hashed header
//! - [`codec`] - the canonical MessagePack encoding used for both wire
//!   frames and hash preimages
//! - [`identity`] - validator identifier canonicalization and matching
//!
//! Hashes are pure functions of the canonical encoding, so two nodes
//! encoding the same structure always derive identical digests.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod block;
pub mod codec;
pub mod hash;
pub mod identity;
pub mod transaction;

pub use block::{Block, BlockHeaderSummary, GENESIS_PROPOSER};
pub use hash::H256;
pub use transaction::{Amount, Transaction};

/// Result type alias for type-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while constructing or validating core types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A sender or recipient identifier was empty
    #[error("empty {0} identifier")]
    EmptyIdentity(&'static str),

    /// The stored tx_id does not match the recomputed digest
    #[error("tx_id mismatch: stored {stored}, computed {computed}")]
    TxIdMismatch {
        /// tx_id carried by the transaction
        stored: H256,
        /// tx_id recomputed from the canonical encoding
        computed: H256,
    },

    /// The stored block_hash does not match the recomputed digest
    #[error("block hash mismatch at height {height}: stored {stored}, computed {computed}")]
    BlockHashMismatch {
        /// Height of the offending block
        height: u64,
        /// Hash carried by the block
        stored: H256,
        /// Hash recomputed from the header fields
        computed: H256,
    },

    /// A byte slice had the wrong length for a hash
    #[error("invalid hash length: expected 32 bytes, got {0}")]
    InvalidHashLength(usize),

    /// A hex string could not be parsed
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Canonical encoding failed
    #[error("encode: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Canonical decoding failed
    #[error("decode: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}
