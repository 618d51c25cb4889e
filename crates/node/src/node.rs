//! Node orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use minichain_config::Config;
use minichain_consensus::{CommitOutcome, ConsensusConfig, PoaEngine, ValidatorSet};
use minichain_mempool::{Mempool, MempoolError};
use minichain_p2p::{
    NetworkConfig, NetworkEvent, NetworkHandle, NetworkService, PeerAddr, PeerStatus,
};
use minichain_storage::ChainStore;
use minichain_types::{identity, Amount, Block, Transaction, H256};
use minichain_wire::Message;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::sync;

/// How long `stop` waits for workers before abandoning them.
const SHUTDOWN_DRAIN: Duration = Duration::from_secs(5);

/// Consensus tick cadence.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Errors that can occur while running a node
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration failure
    #[error("config: {0}")]
    Config(#[from] minichain_config::ConfigError),

    /// Chain store failure
    #[error("storage: {0}")]
    Storage(#[from] minichain_storage::StorageError),

    /// Network failure
    #[error("network: {0}")]
    Network(#[from] minichain_p2p::NetworkError),

    /// Transaction admission failure
    #[error("mempool: {0}")]
    Mempool(#[from] MempoolError),

    /// Two configured identities canonicalize to the same validator
    #[error("validator identity collision on '{0}'")]
    IdentityCollision(String),
}

/// Shared state reachable from every worker task.
pub(crate) struct NodeState {
    pub(crate) self_id: String,
    pub(crate) store: Arc<ChainStore>,
    pub(crate) mempool: Arc<Mempool>,
    pub(crate) engine: Mutex<PoaEngine>,
    pub(crate) network: NetworkHandle,
    /// Set on a fatal error; stops the consensus tick while read
    /// accessors stay alive for diagnostics
    pub(crate) consensus_halted: AtomicBool,
}

/// A running MiniChain validator.
pub struct Node {
    state: Arc<NodeState>,
    stop_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Unix seconds as a float, the protocol's timestamp form.
pub(crate) fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl Node {
    /// Loads the chain, starts the network, and spawns the consensus
    /// tick, heartbeat, and dispatch workers.
    pub async fn start(config: Config) -> Result<Self, NodeError> {
        let self_id = identity::canonical(&config.node.id);

        let mut peer_addrs = Vec::new();
        let mut peer_identities = Vec::new();
        for entry in &config.network.peers {
            let (host, port) = entry.parse()?;
            peer_identities.push(host.clone());
            peer_addrs.push(PeerAddr { host, port });
        }

        // Two hosts collapsing to one canonical identity would silently
        // shrink the validator set; refuse to start instead.
        let mut seen_ids = std::collections::HashSet::new();
        for id in std::iter::once(self_id.clone())
            .chain(peer_identities.iter().map(|h| identity::canonical(h)))
        {
            if !seen_ids.insert(id.clone()) {
                return Err(NodeError::IdentityCollision(id));
            }
        }

        let validators = ValidatorSet::new(&self_id, peer_identities);
        info!(
            node_id = %self_id,
            validators = ?validators.ids(),
            quorum = config.effective_quorum(),
            "starting node"
        );

        let store = Arc::new(ChainStore::load_or_init(
            &config.storage.data_dir,
            validators.ids().to_vec(),
        )?);
        info!(height = store.height(), tip = %store.tip().block_hash, "chain loaded");

        let consensus_config = ConsensusConfig {
            block_interval: Duration::from_secs(config.consensus.block_interval_secs),
            proposal_timeout: Duration::from_secs(config.consensus.proposal_timeout_secs),
            quorum_size: config.effective_quorum(),
            max_txs: config.consensus.max_txs_per_block,
        };
        let engine = PoaEngine::new(
            validators,
            &self_id,
            consensus_config,
            store.height(),
            Instant::now(),
        );

        let network_config = NetworkConfig {
            node_id: self_id.clone(),
            listen_addr: format!("{}:{}", config.node.host, config.node.port),
            listening_port: config.node.port,
            peers: peer_addrs,
            dial_timeout: Duration::from_secs(config.network.dial_timeout_secs),
            heartbeat_timeout: Duration::from_secs(config.network.heartbeat_timeout_secs),
            ..NetworkConfig::default()
        };
        let (network, events_rx) = NetworkService::spawn(network_config).await?;

        let state = Arc::new(NodeState {
            self_id,
            store,
            mempool: Arc::new(Mempool::new()),
            engine: Mutex::new(engine),
            network,
            consensus_halted: AtomicBool::new(false),
        });

        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = vec![
            tokio::spawn(dispatch_loop(Arc::clone(&state), events_rx, stop_rx.clone())),
            tokio::spawn(tick_loop(Arc::clone(&state), stop_rx.clone())),
            tokio::spawn(heartbeat_loop(
                Arc::clone(&state),
                Duration::from_secs(config.network.heartbeat_interval_secs),
                stop_rx,
            )),
        ];

        Ok(Self {
            state,
            stop_tx,
            tasks: Mutex::new(tasks),
        })
    }

    /// Cooperative shutdown: signal every worker, stop the network, and
    /// wait up to 5 s before abandoning connections.
    pub async fn stop(&self) {
        info!("stopping node");
        let _ = self.stop_tx.send(true);
        self.state.network.shutdown(SHUTDOWN_DRAIN).await;

        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN;
        for task in tasks {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if tokio::time::timeout(remaining, task).await.is_err() {
                warn!("worker did not stop within drain window");
                break;
            }
        }
        info!("node stopped");
    }

    /// Builds, admits, and gossips a transaction. Returns its id.
    pub fn submit_transaction(
        &self,
        sender: &str,
        recipient: &str,
        amount: Amount,
    ) -> Result<H256, NodeError> {
        let tx = Transaction::new(sender, recipient, amount, unix_now());
        let tx_id = tx.tx_id;
        self.state.mempool.add(tx.clone())?;
        info!(
            event = "tx_submitted",
            tx_id = %tx_id,
            sender = sender,
            recipient = recipient,
            "transaction admitted"
        );
        self.state.network.broadcast(&Message::tx(&tx));
        Ok(tx_id)
    }

    /// Height of the local tip.
    pub fn height(&self) -> u64 {
        self.state.store.height()
    }

    /// Committed block at a height, if any.
    pub fn get_block(&self, height: u64) -> Option<Block> {
        self.state.store.get_block(height)
    }

    /// Pending transactions in insertion order.
    pub fn mempool_snapshot(&self) -> Vec<Transaction> {
        self.state.mempool.snapshot()
    }

    /// Per-peer liveness snapshots.
    pub fn peers(&self) -> Vec<PeerStatus> {
        self.state.network.peers_status()
    }

    /// Operator clear: drops all pending transactions. Seen history is
    /// preserved, so cleared ids still cannot re-enter via gossip.
    pub fn clear_mempool(&self) {
        self.state.mempool.clear();
        info!(event = "mempool_cleared", "pending transactions dropped");
    }

    /// Leader scheduled for the next height.
    pub fn leader(&self) -> String {
        let engine = self.state.engine.lock();
        engine.leader_for(engine.current_height() + 1).to_string()
    }

    /// True when the local node leads the next height.
    pub fn is_leader(&self) -> bool {
        let engine = self.state.engine.lock();
        engine.is_leader(engine.current_height() + 1)
    }

    /// The local canonical identity.
    pub fn node_id(&self) -> &str {
        &self.state.self_id
    }

    /// Address the listener bound to (useful with port 0).
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.state.network.local_addr()
    }

    /// True when a fatal error stopped consensus.
    pub fn consensus_halted(&self) -> bool {
        self.state.consensus_halted.load(Ordering::SeqCst)
    }
}

/// Consensus tick: propose when scheduled, surface the view-change hook
/// when the round stalls.
async fn tick_loop(state: Arc<NodeState>, mut stop_rx: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = stop_rx.changed() => return,
            _ = tokio::time::sleep(TICK_INTERVAL) => {}
        }
        if state.consensus_halted.load(Ordering::SeqCst) {
            continue;
        }

        let now = Instant::now();
        let proposal = {
            let mut engine = state.engine.lock();
            if engine.should_propose(now) {
                let tip = state.store.tip();
                let txs = state.mempool.take(engine.config().max_txs);
                Some(engine.create_proposal(txs, &tip, unix_now()))
            } else {
                if engine.should_view_change(now) {
                    // TODO(viewchange): broadcast VIEWCHANGE and rotate the
                    // leader once the upstream flow is settled; until then
                    // the stall is only surfaced.
                    warn!(
                        event = "view_change_due",
                        height = engine.current_height() + 1,
                        "round stalled past proposal timeout"
                    );
                }
                None
            }
        };

        if let Some(block) = proposal {
            state.network.broadcast(&Message::propose(&block));
            // The leader's own vote, routed as if it came off the wire.
            let self_id = state.self_id.clone();
            handle_ack(&state, block.height, block.block_hash, &self_id).await;
        }
    }
}

/// Periodic HEARTBEAT broadcast with the local chain position.
async fn heartbeat_loop(
    state: Arc<NodeState>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = stop_rx.changed() => return,
            _ = tokio::time::sleep(interval) => {}
        }
        let tip = state.store.tip();
        state.network.broadcast(&Message::Heartbeat {
            node_id: state.self_id.clone(),
            height: tip.height,
            last_block_hash: tip.block_hash,
        });
    }
}

/// Consumes network events one at a time, serializing all state
/// transitions.
async fn dispatch_loop(
    state: Arc<NodeState>,
    mut events_rx: mpsc::Receiver<NetworkEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let event = tokio::select! {
            _ = stop_rx.changed() => return,
            event = events_rx.recv() => match event {
                Some(event) => event,
                None => return,
            }
        };

        match event {
            NetworkEvent::PeerConnected { addr } => {
                debug!(event = "peer_connected", peer = %addr, "peer up");
            }
            NetworkEvent::PeerDisconnected { addr } => {
                debug!(event = "peer_disconnected", peer = %addr, "peer down");
            }
            NetworkEvent::Frame {
                peer_addr,
                peer_id,
                message,
            } => {
                dispatch(&state, &peer_addr, peer_id.as_deref(), message).await;
            }
        }
    }
}

async fn dispatch(state: &Arc<NodeState>, peer_addr: &str, peer_id: Option<&str>, message: Message) {
    trace!(kind = message.kind(), peer = peer_addr, "dispatching");
    match message {
        Message::Tx {
            tx_id,
            sender,
            recipient,
            amount,
            timestamp,
        } => {
            let tx = Transaction {
                tx_id,
                sender,
                recipient,
                amount,
                timestamp,
            };
            match state.mempool.add(tx.clone()) {
                Ok(()) => {
                    info!(event = "tx_admitted", tx_id = %tx.tx_id, peer = peer_addr, "gossiped transaction admitted");
                    // Amplify dissemination.
                    state.network.broadcast(&Message::tx(&tx));
                }
                Err(MempoolError::AlreadySeen) => {
                    trace!(event = "tx_duplicate", tx_id = %tx.tx_id, peer = peer_addr, "already seen, dropped");
                }
                Err(err) => {
                    warn!(event = "tx_rejected", tx_id = %tx.tx_id, peer = peer_addr, reason = %err, "invalid transaction");
                }
            }
        }

        Message::Propose {
            height,
            prev_hash,
            timestamp,
            proposer_id,
            block_hash,
            tx_list,
        } => {
            let Some(from) = peer_id else {
                warn!(
                    event = "proposal_rejected",
                    height = height,
                    peer = peer_addr,
                    reason = "no HELLO identity for connection",
                    "dropping proposal from unidentified peer"
                );
                return;
            };
            let block = Block {
                height,
                prev_hash,
                timestamp,
                tx_list,
                proposer_id: proposer_id.clone(),
                block_hash,
            };

            let accepted = {
                let mut engine = state.engine.lock();
                let tip = state.store.tip();
                engine.on_proposal(block, from, &tip)
            };
            match accepted {
                Ok(()) => {
                    let ack = Message::Ack {
                        height,
                        block_hash,
                        voter_id: state.self_id.clone(),
                        signature: String::new(),
                    };
                    if let Err(err) = state.network.send_to(&proposer_id, ack).await {
                        warn!(event = "ack_send_failed", height = height, peer = %proposer_id, reason = %err, "could not deliver ack");
                    } else {
                        info!(event = "ack_sent", height = height, peer = %proposer_id, block_hash = %block_hash.short(), "acknowledged proposal");
                    }
                }
                Err(err) => {
                    warn!(event = "proposal_rejected", height = height, peer = peer_addr, reason = %err, "dropping proposal");
                }
            }
        }

        Message::Ack {
            height,
            block_hash,
            voter_id,
            signature: _,
        } => {
            handle_ack(state, height, block_hash, &voter_id).await;
        }

        Message::Commit {
            height,
            block_hash,
            leader_id,
            block: _,
        } => {
            let outcome = state.engine.lock().on_commit(height, block_hash);
            match outcome {
                CommitOutcome::Apply(block) => {
                    apply_commit(state, block, false).await;
                }
                CommitOutcome::NeedSync => {
                    sync::request_catchup(state, &leader_id, height).await;
                }
            }
        }

        Message::Hello {
            node_id,
            listening_port,
            version,
        } => {
            debug!(
                event = "peer_hello",
                peer = peer_addr,
                node_id = %node_id,
                port = listening_port,
                version = %version,
                "handshake received"
            );
        }

        Message::Heartbeat {
            node_id, height, ..
        } => {
            trace!(event = "peer_heartbeat", peer = %node_id, height = height, "liveness updated");
        }

        Message::GetHeaders {
            from_height,
            to_height,
        } => {
            sync::serve_headers(state, peer_addr, from_height, to_height);
        }

        Message::GetBlocks {
            from_height,
            to_height,
        } => {
            sync::serve_blocks(state, peer_addr, from_height, to_height);
        }

        Message::Headers { headers } => {
            trace!(event = "headers_received", peer = peer_addr, count = headers.len(), "headers answered");
        }

        Message::Block { block } => {
            sync::apply_synced_block(state, block);
        }

        Message::ViewChange {
            current_height,
            new_leader_id,
            reason,
        } => {
            // TODO(viewchange): apply the rotation once the upstream flow
            // is settled; the message is only surfaced for now.
            warn!(
                event = "view_change_received",
                height = current_height,
                peer = peer_addr,
                new_leader = %new_leader_id,
                reason = %reason,
                "view change announced"
            );
        }
    }
}

/// Routes one ACK through the engine; applies and announces the commit
/// when this ACK completes quorum.
async fn handle_ack(state: &Arc<NodeState>, height: u64, block_hash: H256, voter: &str) {
    let decision = {
        let mut engine = state.engine.lock();
        match engine.on_ack(height, block_hash, voter) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(event = "ack_rejected", height = height, peer = voter, reason = %err, "dropping ack");
                None
            }
        }
    };

    if let Some(decision) = decision {
        apply_commit(state, decision.block, true).await;
    }
}

/// Durably applies a committed block, prunes its transactions, and
/// advances the engine. `announce` broadcasts COMMIT (leader path).
///
/// A persistence failure here is fatal for the height: consensus halts
/// while read accessors stay alive for diagnostics.
pub(crate) async fn apply_commit(state: &Arc<NodeState>, block: Block, announce: bool) {
    match state.store.add_block(block.clone()) {
        Ok(()) => {
            state.mempool.remove_committed(&block.tx_ids());
            state
                .engine
                .lock()
                .on_block_committed(&block, Instant::now());
            info!(
                event = "commit_applied",
                height = block.height,
                block_hash = %block.block_hash.short(),
                txs = block.tx_count(),
                "block committed"
            );
            if announce {
                state
                    .network
                    .broadcast(&Message::commit(&block, state.self_id.clone()));
            }
        }
        Err(err) => {
            error!(
                event = "commit_failed",
                height = block.height,
                block_hash = %block.block_hash.short(),
                reason = %err,
                "fatal: refusing to advance"
            );
            state.consensus_halted.store(true, Ordering::SeqCst);
        }
    }
}
