//! # MiniChain Consensus
//!
//! Deterministic round-robin Proof-of-Authority over a fixed validator
//! set.
//!
//! ## Protocol flow
//!
//! For each height, exactly one validator is the leader
//! (`validators[height % n]` over the sorted set):
//!
//! 1. **Propose**: once `block_interval` has elapsed since the last
//!    commit, the leader assembles pending transactions and broadcasts
//!    a proposal
//! 2. **Ack**: followers validate the proposal and send an ACK directly
//!    to the proposer; the leader's own vote is implicit
//! 3. **Commit**: at `quorum_size` distinct validator ACKs the leader
//!    commits locally and broadcasts COMMIT; followers commit the
//!    cached proposal on a matching COMMIT
//!
//! ## Safety
//!
//! - A follower caches at most one proposal per height; a second,
//!   differently-hashed proposal from the legitimate leader is dropped
//!   as equivocation
//! - Quorum fires exactly once per height; extra ACKs are no-ops
//! - A COMMIT without a cached proposal never applies a block; it
//!   surfaces a need-sync signal instead

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod ack_set;
pub mod engine;
pub mod validator;

pub use ack_set::{AckSet, AckSetError};
pub use engine::{
    CommitDecision, CommitOutcome, ConsensusConfig, PoaEngine, ProposalError, Step,
};
pub use validator::ValidatorSet;
