//! Per-peer outbound queue.
//!
//! Bounded FIFO between the orchestrator and one connection's writer
//! task. Overflow policy: the oldest non-consensus message in the queue
//! is dropped to make room; PROPOSE/ACK/COMMIT are never dropped - when
//! the queue holds nothing but consensus traffic, pushing another
//! consensus message surfaces backpressure to the caller.

use std::collections::VecDeque;

use minichain_wire::Message;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tracing::{debug, trace};

use crate::{NetworkError, Result};

struct QueueInner {
    items: VecDeque<Message>,
    closed: bool,
}

/// Bounded outbound message queue for one peer connection.
pub struct OutboundQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    closed_tx: watch::Sender<bool>,
    capacity: usize,
    peer: String,
}

impl OutboundQueue {
    /// Creates a queue for the given peer address.
    pub fn new(peer: impl Into<String>, capacity: usize) -> Self {
        let (closed_tx, _) = watch::channel(false);
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            closed_tx,
            capacity: capacity.max(1),
            peer: peer.into(),
        }
    }

    /// Enqueues a message without blocking.
    ///
    /// On overflow, evicts the oldest non-consensus message. A
    /// non-consensus message that finds the queue full of consensus
    /// traffic is itself dropped (logged, `Ok`); a consensus message in
    /// that situation returns [`NetworkError::Backpressure`].
    pub fn push(&self, message: Message) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(NetworkError::ConnectionClosed {
                peer: self.peer.clone(),
            });
        }

        if inner.items.len() >= self.capacity {
            let evictable = inner
                .items
                .iter()
                .position(|m| !m.is_consensus_critical());
            match evictable {
                Some(idx) => {
                    let dropped = inner.items.remove(idx).expect("index from position");
                    debug!(
                        peer = %self.peer,
                        dropped = dropped.kind(),
                        "outbound queue full, dropped oldest non-consensus message"
                    );
                }
                None if message.is_consensus_critical() => {
                    return Err(NetworkError::Backpressure {
                        peer: self.peer.clone(),
                    });
                }
                None => {
                    debug!(
                        peer = %self.peer,
                        dropped = message.kind(),
                        "outbound queue full of consensus traffic, dropped new message"
                    );
                    return Ok(());
                }
            }
        }

        trace!(peer = %self.peer, kind = message.kind(), "enqueued");
        inner.items.push_back(message);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Dequeues the next message, waiting while the queue is empty.
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Message> {
        loop {
            {
                let mut inner = self.inner.lock();
                if let Some(message) = inner.items.pop_front() {
                    return Some(message);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Closes the queue; the writer drains what is left and exits.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        let _ = self.closed_tx.send(true);
        self.notify.notify_one();
    }

    /// Completes once the queue is closed (the connection's lifecycle
    /// signal for its dial loop).
    pub async fn closed_wait(&self) {
        let mut rx = self.closed_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
