//! PoA consensus engine.
//!
//! `PoaEngine` holds the per-height protocol state and makes every
//! consensus decision; it performs no I/O. The node orchestrator drives
//! it: polling [`PoaEngine::should_propose`] on a cadence, feeding it
//! inbound proposals, ACKs, and commits, and applying the blocks it
//! decides to commit.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use minichain_types::{Block, Transaction, H256};
use tracing::{debug, info, trace, warn};

use crate::ack_set::{AckSet, AckSetError};
use crate::validator::ValidatorSet;

/// Consensus parameters, injected by configuration.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Minimum time between block proposals
    pub block_interval: Duration,
    /// Stall time after which the view-change hook fires
    pub proposal_timeout: Duration,
    /// Distinct validator ACKs required to commit (leader included)
    pub quorum_size: usize,
    /// Maximum transactions per proposed block
    pub max_txs: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_secs(5),
            proposal_timeout: Duration::from_secs(10),
            quorum_size: 2,
            max_txs: 100,
        }
    }
}

impl ConsensusConfig {
    /// Zero-interval configuration for tests.
    pub fn fast(quorum_size: usize) -> Self {
        Self {
            block_interval: Duration::ZERO,
            proposal_timeout: Duration::from_millis(100),
            quorum_size,
            max_txs: 100,
        }
    }
}

/// Per-height protocol state, terminal at `Committed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No proposal seen or made at the working height
    Idle,
    /// Local node proposed (leader role)
    Proposed,
    /// Validated a proposal and sent an ACK (follower role)
    Acked,
    /// Quorum reached, commit in flight (leader role)
    Committing,
    /// Block applied; the next height starts at `Idle`
    Committed,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Idle => "Idle",
            Step::Proposed => "Proposed",
            Step::Acked => "Acked",
            Step::Committing => "Committing",
            Step::Committed => "Committed",
        };
        f.write_str(name)
    }
}

/// Reasons a proposal is dropped without an ACK
#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    /// Proposal is not for the unique next height
    #[error("stale or future height: got {got}, expected {expected}")]
    StaleHeight {
        /// Height carried by the proposal
        got: u64,
        /// The only acceptable height
        expected: u64,
    },

    /// Proposal does not link to the local tip
    #[error("parent hash mismatch: got {got}, tip is {tip}")]
    ParentMismatch {
        /// prev_hash carried by the proposal
        got: H256,
        /// Local tip hash
        tip: H256,
    },

    /// Proposer is not the leader for the proposal height
    #[error("wrong proposer for height {height}: expected {expected}, got {got}")]
    WrongProposer {
        /// Proposal height
        height: u64,
        /// Round-robin leader for that height
        expected: String,
        /// Claimed proposer
        got: String,
    },

    /// The claimed proposer does not match the sending peer
    #[error("proposer {claimed} does not match sender {from}")]
    ForgedSender {
        /// proposer_id inside the proposal
        claimed: String,
        /// Identity of the peer that delivered it
        from: String,
    },

    /// Block hash or an embedded transaction failed to recompute
    #[error("invalid block: {0}")]
    InvalidBlock(#[from] minichain_types::Error),

    /// Second, differently-hashed proposal at a height we already
    /// cached; first one wins
    #[error("equivocating proposal at height {height}: cached {cached}, received {received}")]
    Equivocation {
        /// Proposal height
        height: u64,
        /// Hash of the proposal we keep
        cached: H256,
        /// Hash of the proposal we drop
        received: H256,
    },

    /// Re-delivery of the proposal we already acknowledged
    #[error("duplicate proposal at height {height}")]
    DuplicateProposal {
        /// Proposal height
        height: u64,
    },
}

/// The leader's decision to commit after reaching quorum.
#[derive(Debug, Clone)]
pub struct CommitDecision {
    /// The block to apply and announce
    pub block: Block,
}

/// Outcome of processing a COMMIT announcement.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// The cached proposal matches; apply this block
    Apply(Block),
    /// No matching cached proposal; the node missed the PROPOSE and
    /// must catch up via sync
    NeedSync,
}

/// Round-robin PoA consensus engine.
pub struct PoaEngine {
    validators: ValidatorSet,
    self_id: String,
    config: ConsensusConfig,

    /// Mirrors the chain tip height
    current_height: u64,
    /// Monotonic time of the last commit (or engine start)
    last_block_time: Instant,
    /// The proposal cached at `current_height + 1`, if any; the only
    /// block this node will commit at that height
    pending_proposal: Option<Block>,
    /// ACK tallies by target height (leader role)
    acks: HashMap<u64, AckSet>,
    /// Heights whose quorum already fired; blocks a second commit
    committing: HashSet<u64>,
    /// Protocol step at the working height
    step: Step,
}

impl PoaEngine {
    /// Creates an engine at the given chain tip.
    pub fn new(
        validators: ValidatorSet,
        self_id: &str,
        config: ConsensusConfig,
        tip_height: u64,
        now: Instant,
    ) -> Self {
        let self_id = minichain_types::identity::canonical(self_id);
        debug_assert!(validators.contains(&self_id));
        Self {
            validators,
            self_id,
            config,
            current_height: tip_height,
            last_block_time: now,
            pending_proposal: None,
            acks: HashMap::new(),
            committing: HashSet::new(),
            step: Step::Idle,
        }
    }

    /// The round-robin leader for a target height.
    pub fn leader_for(&self, height: u64) -> &str {
        self.validators.leader_for(height)
    }

    /// True when the local node leads the given height.
    pub fn is_leader(&self, height: u64) -> bool {
        self.leader_for(height) == self.self_id
    }

    /// True when it is time for the local node to propose the next
    /// block: we lead `current_height + 1`, the block interval elapsed,
    /// that height is not already committing, and we have not already
    /// proposed or cached a proposal for it.
    pub fn should_propose(&self, now: Instant) -> bool {
        let next = self.current_height + 1;
        if !self.is_leader(next) {
            return false;
        }
        if now.duration_since(self.last_block_time) < self.config.block_interval {
            return false;
        }
        if self.committing.contains(&next) {
            return false;
        }
        if let Some(pending) = &self.pending_proposal {
            if pending.height == next {
                return false;
            }
        }
        true
    }

    /// Assembles the next proposal from the given pending transactions
    /// (insertion order, truncated to `max_txs`), caches it, and seeds
    /// its ACK tally. The caller broadcasts it and routes the implicit
    /// self-ACK back through [`Self::on_ack`].
    pub fn create_proposal(
        &mut self,
        mut txs: Vec<Transaction>,
        tip: &Block,
        now_unix: f64,
    ) -> Block {
        txs.truncate(self.config.max_txs);
        let height = self.current_height + 1;
        let block = Block::new(height, tip.block_hash, now_unix, txs, self.self_id.clone());

        info!(
            event = "proposal_created",
            height = height,
            block_hash = %block.block_hash.short(),
            txs = block.tx_count(),
            "proposing block"
        );

        self.acks
            .insert(height, AckSet::new(height, block.block_hash));
        self.pending_proposal = Some(block.clone());
        self.step = Step::Proposed;
        block
    }

    /// Validates an inbound proposal (follower role) and caches it.
    ///
    /// Checks, in order: height continuity, parent linkage, proposer
    /// legitimacy (round-robin leader and matching sender), hash
    /// integrity, and embedded transaction validity. A failed check
    /// drops the proposal without an ACK.
    pub fn on_proposal(
        &mut self,
        block: Block,
        from: &str,
        tip: &Block,
    ) -> Result<(), ProposalError> {
        let expected_height = self.current_height + 1;
        if block.height != expected_height {
            return Err(ProposalError::StaleHeight {
                got: block.height,
                expected: expected_height,
            });
        }
        if block.prev_hash != tip.block_hash {
            return Err(ProposalError::ParentMismatch {
                got: block.prev_hash,
                tip: tip.block_hash,
            });
        }
        let leader = self.leader_for(block.height);
        if !minichain_types::identity::matches(&block.proposer_id, leader) {
            return Err(ProposalError::WrongProposer {
                height: block.height,
                expected: leader.to_string(),
                got: block.proposer_id.clone(),
            });
        }
        if !minichain_types::identity::matches(&block.proposer_id, from) {
            return Err(ProposalError::ForgedSender {
                claimed: block.proposer_id.clone(),
                from: from.to_string(),
            });
        }
        block.validate_basic()?;

        if let Some(cached) = &self.pending_proposal {
            if cached.height == block.height {
                if cached.block_hash == block.block_hash {
                    return Err(ProposalError::DuplicateProposal {
                        height: block.height,
                    });
                }
                warn!(
                    event = "equivocation",
                    height = block.height,
                    peer = from,
                    block_hash = %block.block_hash.short(),
                    "dropping second proposal from leader; keeping first"
                );
                return Err(ProposalError::Equivocation {
                    height: block.height,
                    cached: cached.block_hash,
                    received: block.block_hash,
                });
            }
        }

        debug!(
            event = "proposal_accepted",
            height = block.height,
            peer = from,
            block_hash = %block.block_hash.short(),
            "cached proposal"
        );
        self.pending_proposal = Some(block);
        self.step = Step::Acked;
        Ok(())
    }

    /// Records an ACK (leader role).
    ///
    /// ACKs are only meaningful while we hold a matching pending
    /// proposal that we lead; anything else is dropped. Returns the
    /// commit decision exactly once, when the tally first reaches
    /// quorum.
    pub fn on_ack(
        &mut self,
        height: u64,
        block_hash: H256,
        voter: &str,
    ) -> Result<Option<CommitDecision>, AckSetError> {
        let Some(pending) = &self.pending_proposal else {
            trace!(height = height, voter = voter, "ack without pending proposal, dropping");
            return Ok(None);
        };
        if pending.height != height || !self.is_leader(height) {
            trace!(height = height, voter = voter, "ack for foreign height, dropping");
            return Ok(None);
        }

        let ack_set = self
            .acks
            .entry(height)
            .or_insert_with(|| AckSet::new(height, pending.block_hash));
        let count = ack_set.add_ack(height, block_hash, voter, &self.validators)?;

        debug!(
            event = "ack_recorded",
            height = height,
            peer = voter,
            count = count,
            quorum = self.config.quorum_size,
            "ack tallied"
        );

        if count >= self.config.quorum_size && !self.committing.contains(&height) {
            self.committing.insert(height);
            self.step = Step::Committing;
            let block = pending.clone();
            info!(
                event = "quorum_reached",
                height = height,
                block_hash = %block.block_hash.short(),
                acks = count,
                "committing"
            );
            return Ok(Some(CommitDecision { block }));
        }
        Ok(None)
    }

    /// Handles a COMMIT announcement (follower role).
    ///
    /// Returns the cached block for finalization when it matches, or
    /// [`CommitOutcome::NeedSync`] when this node missed the proposal.
    pub fn on_commit(&mut self, height: u64, block_hash: H256) -> CommitOutcome {
        match &self.pending_proposal {
            Some(pending) if pending.height == height && pending.block_hash == block_hash => {
                CommitOutcome::Apply(pending.clone())
            }
            _ => {
                warn!(
                    event = "need_sync",
                    height = height,
                    block_hash = %block_hash.short(),
                    "commit without matching cached proposal"
                );
                CommitOutcome::NeedSync
            }
        }
    }

    /// Advances engine state after a block was durably applied.
    ///
    /// Clears the pending proposal, the ACK tally, and the committing
    /// mark for that height; the next height starts at `Idle`.
    pub fn on_block_committed(&mut self, block: &Block, now: Instant) {
        self.current_height = block.height;
        self.last_block_time = now;
        self.pending_proposal = None;
        self.acks.remove(&block.height);
        self.committing.remove(&block.height);
        self.step = Step::Idle;

        info!(
            event = "block_committed",
            height = block.height,
            block_hash = %block.block_hash.short(),
            txs = block.tx_count(),
            "height advanced"
        );
    }

    /// View-change hook: true when the next height's leader (us) has
    /// watched the round stall past `proposal_timeout` with no proposal
    /// in flight.
    ///
    /// TODO(viewchange): the VIEWCHANGE flow is incomplete upstream -
    /// re-proposal semantics and follower recognition of the rotated
    /// leader are unresolved, so callers only log when this fires.
    pub fn should_view_change(&self, now: Instant) -> bool {
        let next = self.current_height + 1;
        if !self.is_leader(next) {
            return false;
        }
        if now.duration_since(self.last_block_time) <= self.config.proposal_timeout {
            return false;
        }
        match &self.pending_proposal {
            Some(pending) => pending.height != next,
            None => true,
        }
    }

    /// Height of the last committed block this engine knows of.
    pub fn current_height(&self) -> u64 {
        self.current_height
    }

    /// The proposal cached at the working height, if any.
    pub fn pending_proposal(&self) -> Option<&Block> {
        self.pending_proposal.as_ref()
    }

    /// Protocol step at the working height.
    pub fn step(&self) -> Step {
        self.step
    }

    /// The validator set.
    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    /// The local canonical identity.
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// The configured parameters.
    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Number of ACKs tallied at a height (0 when none).
    pub fn ack_count(&self, height: u64) -> usize {
        self.acks.get(&height).map(AckSet::count).unwrap_or(0)
    }
}
