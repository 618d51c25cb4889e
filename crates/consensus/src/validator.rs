//! Validator set management.
//!
//! The set is fixed for the lifetime of a run: the local identity
//! unioned with the configured peer identities, each canonicalized to
//! one representation per host, deduplicated, and sorted. Sorting makes
//! the round-robin rotation identical on every node.

use minichain_types::identity;
use serde::{Deserialize, Serialize};

/// Immutable, sorted set of validator identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorSet {
    ids: Vec<String>,
}

impl ValidatorSet {
    /// Builds the set from the local identity and the configured peer
    /// identities.
    pub fn new(self_id: &str, peer_ids: impl IntoIterator<Item = String>) -> Self {
        let mut ids: Vec<String> = std::iter::once(self_id.to_string())
            .chain(peer_ids)
            .map(|id| identity::canonical(&id))
            .collect();
        ids.sort();
        ids.dedup();
        Self { ids }
    }

    /// The round-robin leader for a target height.
    pub fn leader_for(&self, height: u64) -> &str {
        &self.ids[height as usize % self.ids.len()]
    }

    /// True when `id` names a validator (full or first-label match).
    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|v| identity::matches(v, id))
    }

    /// Simple-majority quorum: `floor(n / 2) + 1`.
    pub fn majority_quorum(&self) -> usize {
        self.ids.len() / 2 + 1
    }

    /// Number of validators.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when the set is empty (never the case for a running node).
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The sorted identifiers.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }
}
