//! # MiniChain Mempool
//!
//! Deduplicated store of valid, uncommitted transactions awaiting
//! inclusion in a block.
//!
//! The pool keeps two structures behind a single mutex:
//! - the pending map, `tx_id -> Transaction`, preserving insertion order
//!   for proposal building
//! - the `seen` set: every tx_id ever admitted or observed committed,
//!   never pruned, used to suppress re-gossip
//!
//! A tx_id that was ever seen is rejected forever, even after the
//! transaction left the pending map - this is what stops gossip storms
//! from re-admitting committed transactions.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod pool;

pub use pool::Mempool;

/// Result type alias for mempool operations
pub type Result<T> = std::result::Result<T, MempoolError>;

/// Errors that can occur when admitting a transaction
#[derive(Debug, thiserror::Error)]
pub enum MempoolError {
    /// The tx_id was admitted or observed committed before
    #[error("transaction already seen")]
    AlreadySeen,

    /// Structural validation of the transaction failed
    #[error("invalid transaction: {0}")]
    Invalid(#[from] minichain_types::Error),
}
