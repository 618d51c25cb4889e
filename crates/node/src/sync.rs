//! Catch-up sync: serving header/block ranges and healing commit gaps.
//!
//! A node that sees a COMMIT for a proposal it never cached has fallen
//! behind. It requests the missing range from the committing leader and
//! applies the returned blocks strictly in order through the chain
//! store's regular validation; transactions carried by synced blocks
//! are evicted from the mempool and recorded as seen.

use std::sync::Arc;
use std::time::Instant;

use minichain_types::Block;
use minichain_wire::Message;
use tracing::{debug, info, warn};

use crate::node::NodeState;

/// Answers a GETHEADERS request with header summaries from the store.
pub(crate) fn serve_headers(state: &Arc<NodeState>, peer_addr: &str, from: u64, to: u64) {
    let headers = state
        .store
        .get_blocks(from, to)
        .iter()
        .map(Block::header_summary)
        .collect::<Vec<_>>();
    debug!(
        event = "headers_served",
        peer = peer_addr,
        from = from,
        to = to,
        count = headers.len(),
        "answering header request"
    );
    state
        .network
        .send_to_addr(peer_addr, Message::Headers { headers });
}

/// Answers a GETBLOCKS request with one BLOCK message per block.
pub(crate) fn serve_blocks(state: &Arc<NodeState>, peer_addr: &str, from: u64, to: u64) {
    let blocks = state.store.get_blocks(from, to);
    debug!(
        event = "blocks_served",
        peer = peer_addr,
        from = from,
        to = to,
        count = blocks.len(),
        "answering block request"
    );
    for block in blocks {
        state
            .network
            .send_to_addr(peer_addr, Message::Block { block });
    }
}

/// Requests the blocks between the local tip and a commit the node
/// could not apply.
pub(crate) async fn request_catchup(state: &Arc<NodeState>, from_peer: &str, commit_height: u64) {
    let local_height = state.store.height();
    if commit_height <= local_height {
        return;
    }
    info!(
        event = "sync_requested",
        height = commit_height,
        peer = from_peer,
        local_height = local_height,
        "requesting missing blocks"
    );
    let request = Message::GetBlocks {
        from_height: local_height + 1,
        to_height: commit_height,
    };
    if let Err(err) = state.network.send_to(from_peer, request).await {
        warn!(
            event = "sync_request_failed",
            height = commit_height,
            peer = from_peer,
            reason = %err,
            "could not reach peer for catch-up"
        );
    }
}

/// Applies one synced block when it is the unique next block; anything
/// else is dropped (already held, or still ahead of us).
pub(crate) fn apply_synced_block(state: &Arc<NodeState>, block: Block) {
    let next = state.store.height() + 1;
    if block.height != next {
        debug!(
            event = "sync_block_skipped",
            height = block.height,
            expected = next,
            "out-of-order sync block"
        );
        return;
    }

    match state.store.add_block(block.clone()) {
        Ok(()) => {
            state.mempool.remove_committed(&block.tx_ids());
            state
                .engine
                .lock()
                .on_block_committed(&block, Instant::now());
            info!(
                event = "sync_block_applied",
                height = block.height,
                block_hash = %block.block_hash.short(),
                txs = block.tx_count(),
                "caught up one block"
            );
        }
        Err(err) => {
            warn!(
                event = "sync_block_rejected",
                height = block.height,
                block_hash = %block.block_hash.short(),
                reason = %err,
                "synced block failed validation"
            );
        }
    }
}
