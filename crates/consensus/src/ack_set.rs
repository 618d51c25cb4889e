//! ACK collection and quorum detection.
//!
//! One `AckSet` tracks the distinct validators that acknowledged a
//! specific `(height, block_hash)` proposal. Votes from non-validators,
//! votes for a different hash, and duplicate votes are rejected with a
//! typed error; the caller decides when the count crosses quorum.

use std::collections::BTreeSet;

use minichain_types::H256;
use tracing::trace;

use crate::validator::ValidatorSet;

/// Errors for ACK tally operations
#[derive(Debug, thiserror::Error)]
pub enum AckSetError {
    /// ACK height does not match the tracked proposal
    #[error("ack height {ack_height} does not match proposal height {expected_height}")]
    WrongHeight {
        /// Height carried by the ACK
        ack_height: u64,
        /// Height of the tracked proposal
        expected_height: u64,
    },

    /// ACK is for a different block hash
    #[error("ack block hash {ack_hash} does not match proposal {expected_hash}")]
    WrongBlockHash {
        /// Hash carried by the ACK
        ack_hash: H256,
        /// Hash of the tracked proposal
        expected_hash: H256,
    },

    /// Voter is not in the validator set
    #[error("ack from non-validator {0}")]
    UnknownValidator(String),

    /// Voter already acknowledged this proposal
    #[error("duplicate ack from {0}")]
    DuplicateAck(String),
}

/// Distinct-voter tally for one proposal.
#[derive(Debug, Clone)]
pub struct AckSet {
    height: u64,
    block_hash: H256,
    voters: BTreeSet<String>,
}

impl AckSet {
    /// Creates a tally for the given proposal.
    pub fn new(height: u64, block_hash: H256) -> Self {
        Self {
            height,
            block_hash,
            voters: BTreeSet::new(),
        }
    }

    /// Records a vote.
    ///
    /// Returns the updated distinct-voter count on success.
    pub fn add_ack(
        &mut self,
        height: u64,
        block_hash: H256,
        voter: &str,
        validators: &ValidatorSet,
    ) -> Result<usize, AckSetError> {
        if height != self.height {
            return Err(AckSetError::WrongHeight {
                ack_height: height,
                expected_height: self.height,
            });
        }
        if block_hash != self.block_hash {
            return Err(AckSetError::WrongBlockHash {
                ack_hash: block_hash,
                expected_hash: self.block_hash,
            });
        }
        if !validators.contains(voter) {
            return Err(AckSetError::UnknownValidator(voter.to_string()));
        }

        let canonical = minichain_types::identity::canonical(voter);
        if !self.voters.insert(canonical) {
            return Err(AckSetError::DuplicateAck(voter.to_string()));
        }

        trace!(
            height = self.height,
            block_hash = %self.block_hash.short(),
            voter = voter,
            count = self.voters.len(),
            "recorded ack"
        );
        Ok(self.voters.len())
    }

    /// Number of distinct voters recorded.
    pub fn count(&self) -> usize {
        self.voters.len()
    }

    /// True once at least `quorum` distinct validators voted.
    pub fn has_quorum(&self, quorum: usize) -> bool {
        self.voters.len() >= quorum
    }

    /// Height this tally tracks.
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Block hash this tally tracks.
    pub fn block_hash(&self) -> H256 {
        self.block_hash
    }

    /// The voters recorded so far, in sorted order.
    pub fn voters(&self) -> impl Iterator<Item = &str> {
        self.voters.iter().map(String::as_str)
    }
}
