//! Wire message payloads.
//!
//! Every frame decodes to exactly one [`Message`] variant. The enum is
//! internally tagged on `"type"`, so the encoded form is a map whose
//! `type` key names the variant and whose remaining keys are the typed
//! payload fields - dispatch happens on the variant, never by probing
//! map keys.

use minichain_types::{codec, Amount, Block, BlockHeaderSummary, Transaction, H256};
use serde::{Deserialize, Serialize};

use crate::Result;

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// Gossiped transaction
    #[serde(rename = "TX")]
    Tx {
        /// Transaction id (must recompute from the other fields)
        tx_id: H256,
        /// Source identity
        sender: String,
        /// Destination identity
        recipient: String,
        /// Transfer value in subunits
        amount: Amount,
        /// Submission time, Unix seconds
        timestamp: f64,
    },

    /// Block proposal broadcast by the height leader
    #[serde(rename = "PROPOSE")]
    Propose {
        /// Proposed block height
        height: u64,
        /// Parent block hash
        prev_hash: H256,
        /// Proposal time, Unix seconds
        timestamp: f64,
        /// Proposing validator
        proposer_id: String,
        /// Hash of the proposed block
        block_hash: H256,
        /// Transactions included in the proposal
        tx_list: Vec<Transaction>,
    },

    /// Follower acknowledgement sent to the proposer
    #[serde(rename = "ACK")]
    Ack {
        /// Height being acknowledged
        height: u64,
        /// Hash of the acknowledged proposal
        block_hash: H256,
        /// Acknowledging validator
        voter_id: String,
        /// Reserved; empty in the current protocol
        signature: String,
    },

    /// Commit announcement broadcast by the leader after quorum
    #[serde(rename = "COMMIT")]
    Commit {
        /// Committed height
        height: u64,
        /// Hash of the committed block
        block_hash: H256,
        /// Committing leader
        leader_id: String,
        /// Full committed block
        block: Block,
    },

    /// Connection handshake
    #[serde(rename = "HELLO")]
    Hello {
        /// Sender identity
        node_id: String,
        /// Port the sender accepts connections on
        listening_port: u16,
        /// Software version string
        version: String,
    },

    /// Periodic liveness announcement
    #[serde(rename = "HEARTBEAT")]
    Heartbeat {
        /// Sender identity
        node_id: String,
        /// Sender chain height
        height: u64,
        /// Sender tip hash
        last_block_hash: H256,
    },

    /// Request block header summaries for a height range
    #[serde(rename = "GETHEADERS")]
    GetHeaders {
        /// First height requested (inclusive)
        from_height: u64,
        /// Last height requested (inclusive)
        to_height: u64,
    },

    /// Header summaries answering a `GETHEADERS`
    #[serde(rename = "HEADERS")]
    Headers {
        /// Header summaries, ascending by height
        headers: Vec<BlockHeaderSummary>,
    },

    /// Request full blocks for a height range
    #[serde(rename = "GETBLOCKS")]
    GetBlocks {
        /// First height requested (inclusive)
        from_height: u64,
        /// Last height requested (inclusive)
        to_height: u64,
    },

    /// One full block answering a `GETBLOCKS`
    #[serde(rename = "BLOCK")]
    Block {
        /// The requested block
        block: Block,
    },

    /// Leader-rotation announcement after a stalled round
    #[serde(rename = "VIEWCHANGE")]
    ViewChange {
        /// Height the sender observed stalling
        current_height: u64,
        /// Leader the sender expects to take over
        new_leader_id: String,
        /// Human-readable trigger description
        reason: String,
    },
}

impl Message {
    /// Builds a `TX` message from a transaction.
    pub fn tx(tx: &Transaction) -> Self {
        Message::Tx {
            tx_id: tx.tx_id,
            sender: tx.sender.clone(),
            recipient: tx.recipient.clone(),
            amount: tx.amount,
            timestamp: tx.timestamp,
        }
    }

    /// Builds a `PROPOSE` message from a block.
    pub fn propose(block: &Block) -> Self {
        Message::Propose {
            height: block.height,
            prev_hash: block.prev_hash,
            timestamp: block.timestamp,
            proposer_id: block.proposer_id.clone(),
            block_hash: block.block_hash,
            tx_list: block.tx_list.clone(),
        }
    }

    /// Builds a `COMMIT` message from a committed block.
    pub fn commit(block: &Block, leader_id: impl Into<String>) -> Self {
        Message::Commit {
            height: block.height,
            block_hash: block.block_hash,
            leader_id: leader_id.into(),
            block: block.clone(),
        }
    }

    /// Encodes this message with the canonical encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(codec::to_canonical_vec(self)?)
    }

    /// Decodes a message from a frame payload.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        Ok(codec::from_canonical_slice(buf)?)
    }

    /// The wire `type` tag, for log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Tx { .. } => "TX",
            Message::Propose { .. } => "PROPOSE",
            Message::Ack { .. } => "ACK",
            Message::Commit { .. } => "COMMIT",
            Message::Hello { .. } => "HELLO",
            Message::Heartbeat { .. } => "HEARTBEAT",
            Message::GetHeaders { .. } => "GETHEADERS",
            Message::Headers { .. } => "HEADERS",
            Message::GetBlocks { .. } => "GETBLOCKS",
            Message::Block { .. } => "BLOCK",
            Message::ViewChange { .. } => "VIEWCHANGE",
        }
    }

    /// True for PROPOSE/ACK/COMMIT, which outbound queues must never
    /// drop on overflow.
    pub fn is_consensus_critical(&self) -> bool {
        matches!(
            self,
            Message::Propose { .. } | Message::Ack { .. } | Message::Commit { .. }
        )
    }
}
