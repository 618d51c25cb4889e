//! Tests for the PoA engine

use std::time::{Duration, Instant};

use minichain_consensus::{
    CommitOutcome, ConsensusConfig, PoaEngine, ProposalError, Step, ValidatorSet,
};
use minichain_types::{Amount, Block, Transaction};

/// Sorted validators {a, b, c}: Leader(1) = b, Leader(2) = c, Leader(3) = a.
fn validators() -> ValidatorSet {
    ValidatorSet::new("a", vec!["b".to_string(), "c".to_string()])
}

fn engine(self_id: &str, quorum: usize) -> PoaEngine {
    PoaEngine::new(
        validators(),
        self_id,
        ConsensusConfig::fast(quorum),
        0,
        Instant::now(),
    )
}

fn tx(amount: u64) -> Transaction {
    Transaction::new("alice", "bob", Amount::from_subunits(amount), amount as f64)
}

#[test]
fn test_leader_rotation() {
    let eng = engine("b", 2);
    assert_eq!(eng.leader_for(1), "b");
    assert_eq!(eng.leader_for(2), "c");
    assert_eq!(eng.leader_for(3), "a");
    assert!(eng.is_leader(1));
    assert!(!eng.is_leader(2));
}

#[test]
fn test_should_propose_only_for_scheduled_leader() {
    let now = Instant::now();
    assert!(engine("b", 2).should_propose(now));
    assert!(!engine("a", 2).should_propose(now));
    assert!(!engine("c", 2).should_propose(now));
}

#[test]
fn test_should_propose_respects_block_interval() {
    let start = Instant::now();
    let config = ConsensusConfig {
        block_interval: Duration::from_secs(5),
        ..ConsensusConfig::fast(2)
    };
    let eng = PoaEngine::new(validators(), "b", config, 0, start);

    assert!(!eng.should_propose(start));
    assert!(!eng.should_propose(start + Duration::from_secs(4)));
    assert!(eng.should_propose(start + Duration::from_secs(5)));
}

#[test]
fn test_happy_path_three_validators() {
    // S1: b leads height 1 with quorum 2. The leader proposes, self-acks,
    // and one follower ACK completes quorum.
    let mut leader = engine("b", 2);
    let mut follower = engine("a", 2);
    let genesis = Block::genesis();

    let t1 = Transaction::new("alice", "bob", Amount::from_subunits(10), 1.0);
    let block = leader.create_proposal(vec![t1.clone()], &genesis, 1.5);
    assert_eq!(block.height, 1);
    assert_eq!(block.proposer_id, "b");
    assert_eq!(leader.step(), Step::Proposed);

    // Implicit self-vote, routed as if from self.
    assert!(leader
        .on_ack(1, block.block_hash, "b")
        .unwrap()
        .is_none());

    // Follower validates the proposal and would send its ACK.
    follower
        .on_proposal(block.clone(), "b", &genesis)
        .unwrap();
    assert_eq!(follower.step(), Step::Acked);

    // The follower's ACK completes quorum exactly once.
    let decision = leader.on_ack(1, block.block_hash, "a").unwrap().unwrap();
    assert_eq!(decision.block.block_hash, block.block_hash);
    assert_eq!(leader.step(), Step::Committing);

    // Both sides finalize.
    leader.on_block_committed(&decision.block, Instant::now());
    assert_eq!(leader.current_height(), 1);
    assert!(leader.pending_proposal().is_none());
    assert_eq!(leader.ack_count(1), 0);

    match follower.on_commit(1, block.block_hash) {
        CommitOutcome::Apply(applied) => {
            follower.on_block_committed(&applied, Instant::now());
        }
        CommitOutcome::NeedSync => panic!("follower had the proposal cached"),
    }
    assert_eq!(follower.current_height(), 1);
}

#[test]
fn test_extra_ack_after_quorum_is_a_noop() {
    let mut leader = engine("b", 2);
    let genesis = Block::genesis();
    let block = leader.create_proposal(vec![], &genesis, 1.0);

    leader.on_ack(1, block.block_hash, "b").unwrap();
    assert!(leader.on_ack(1, block.block_hash, "a").unwrap().is_some());

    // A quorum_size+1'th ACK must not produce a second commit decision.
    assert!(leader.on_ack(1, block.block_hash, "c").unwrap().is_none());
}

#[test]
fn test_wrong_proposer_is_dropped() {
    // S4: a forges a proposal for height 1 where b is the leader.
    let mut follower = engine("c", 2);
    let genesis = Block::genesis();
    let forged = Block::new(1, genesis.block_hash, 1.0, vec![], "a");

    assert!(matches!(
        follower.on_proposal(forged, "a", &genesis),
        Err(ProposalError::WrongProposer { height: 1, .. })
    ));
    assert!(follower.pending_proposal().is_none());
    assert_eq!(follower.step(), Step::Idle);
}

#[test]
fn test_forged_sender_is_dropped() {
    // The proposal names the right leader but arrives from someone else.
    let mut follower = engine("a", 2);
    let genesis = Block::genesis();
    let block = Block::new(1, genesis.block_hash, 1.0, vec![], "b");

    assert!(matches!(
        follower.on_proposal(block, "c", &genesis),
        Err(ProposalError::ForgedSender { .. })
    ));
}

#[test]
fn test_stale_and_future_heights_are_dropped() {
    let mut follower = engine("a", 2);
    let genesis = Block::genesis();

    let future = Block::new(5, genesis.block_hash, 1.0, vec![], "c");
    assert!(matches!(
        follower.on_proposal(future, "c", &genesis),
        Err(ProposalError::StaleHeight { got: 5, expected: 1 })
    ));
}

#[test]
fn test_equivocation_keeps_first_proposal() {
    let mut follower = engine("a", 2);
    let genesis = Block::genesis();

    let first = Block::new(1, genesis.block_hash, 1.0, vec![], "b");
    let second = Block::new(1, genesis.block_hash, 2.0, vec![tx(7)], "b");
    assert_ne!(first.block_hash, second.block_hash);

    follower.on_proposal(first.clone(), "b", &genesis).unwrap();
    assert!(matches!(
        follower.on_proposal(second, "b", &genesis),
        Err(ProposalError::Equivocation { height: 1, .. })
    ));
    assert_eq!(
        follower.pending_proposal().unwrap().block_hash,
        first.block_hash
    );
}

#[test]
fn test_duplicate_proposal_not_acked_twice() {
    let mut follower = engine("a", 2);
    let genesis = Block::genesis();
    let block = Block::new(1, genesis.block_hash, 1.0, vec![], "b");

    follower.on_proposal(block.clone(), "b", &genesis).unwrap();
    assert!(matches!(
        follower.on_proposal(block, "b", &genesis),
        Err(ProposalError::DuplicateProposal { height: 1 })
    ));
}

#[test]
fn test_commit_without_proposal_needs_sync() {
    let mut follower = engine("a", 2);
    let genesis = Block::genesis();
    let block = Block::new(1, genesis.block_hash, 1.0, vec![], "b");

    match follower.on_commit(1, block.block_hash) {
        CommitOutcome::NeedSync => {}
        CommitOutcome::Apply(_) => panic!("nothing was cached"),
    }
}

#[test]
fn test_empty_mempool_proposes_empty_block() {
    let mut leader = engine("b", 2);
    let genesis = Block::genesis();
    let block = leader.create_proposal(vec![], &genesis, 1.0);
    assert!(block.tx_list.is_empty());
    assert!(block.validate_basic().is_ok());
}

#[test]
fn test_max_txs_cap() {
    let config = ConsensusConfig {
        max_txs: 3,
        ..ConsensusConfig::fast(2)
    };
    let mut leader = PoaEngine::new(validators(), "b", config, 0, Instant::now());
    let genesis = Block::genesis();

    let txs: Vec<_> = (1..=10).map(tx).collect();
    let block = leader.create_proposal(txs.clone(), &genesis, 1.0);

    assert_eq!(block.tx_count(), 3);
    // Insertion order is preserved; the rest stay in the mempool.
    assert_eq!(block.tx_list, txs[..3].to_vec());
}

#[test]
fn test_acks_from_non_validators_are_dropped() {
    let mut leader = engine("b", 2);
    let genesis = Block::genesis();
    let block = leader.create_proposal(vec![], &genesis, 1.0);

    assert!(leader.on_ack(1, block.block_hash, "mallory").is_err());
    assert_eq!(leader.ack_count(1), 0);
}

#[test]
fn test_stalled_round_makes_no_progress() {
    // S3: the leader proposed and vanished; ACKs never reach quorum.
    // The view-change hook fires at the height's scheduled leader after
    // the timeout, but no commit happens (re-proposal after a stall is
    // an open protocol item).
    let start = Instant::now();
    let config = ConsensusConfig {
        proposal_timeout: Duration::from_secs(10),
        ..ConsensusConfig::fast(2)
    };
    // c leads height 2; at height 1 (leader b) c is just a follower.
    let follower = PoaEngine::new(validators(), "c", config.clone(), 0, start);

    assert_eq!(follower.current_height(), 0);
    assert!(!follower.should_view_change(start + Duration::from_secs(5)));

    // b leads height 1, so b's own stall check fires there, not c's.
    let next_leader = PoaEngine::new(validators(), "b", config, 0, start);
    assert!(next_leader.should_view_change(start + Duration::from_secs(11)));
    assert_eq!(next_leader.current_height(), 0);
}

#[test]
fn test_view_change_suppressed_by_pending_proposal() {
    let start = Instant::now();
    let config = ConsensusConfig {
        proposal_timeout: Duration::from_millis(10),
        ..ConsensusConfig::fast(2)
    };
    let mut leader = PoaEngine::new(validators(), "b", config, 0, start);
    let genesis = Block::genesis();

    leader.create_proposal(vec![], &genesis, 1.0);
    assert!(!leader.should_view_change(start + Duration::from_secs(1)));
}

#[test]
fn test_post_commit_state_is_clean() {
    // P4: after commit, no ACKs and no pending proposal remain for the
    // committed height.
    let mut leader = engine("b", 2);
    let genesis = Block::genesis();
    let block = leader.create_proposal(vec![tx(1)], &genesis, 1.0);

    leader.on_ack(1, block.block_hash, "b").unwrap();
    let decision = leader.on_ack(1, block.block_hash, "c").unwrap().unwrap();
    leader.on_block_committed(&decision.block, Instant::now());

    assert_eq!(leader.current_height(), 1);
    assert_eq!(leader.ack_count(1), 0);
    assert!(leader.pending_proposal().is_none());
    assert_eq!(leader.step(), Step::Idle);

    // Proposer of the committed block is the scheduled leader (P2).
    assert_eq!(decision.block.proposer_id, "b");
}
