//! Pool implementation.

use std::collections::{HashMap, HashSet, VecDeque};

use minichain_types::{Transaction, H256};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{MempoolError, Result};

/// Internal pool state; one mutex covers both maps so admission and the
/// seen check are a single atomic step.
#[derive(Default)]
struct PoolInner {
    /// Pending transactions by id
    by_id: HashMap<H256, Transaction>,
    /// Insertion order of pending ids (may contain ids already removed;
    /// filtered lazily on read)
    order: VecDeque<H256>,
    /// Every id ever admitted or observed committed
    seen: HashSet<H256>,
}

/// Thread-safe pending-transaction pool.
pub struct Mempool {
    inner: Mutex<PoolInner>,
}

impl Mempool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Admits a transaction.
    ///
    /// Rejects when the id was ever seen or when structural validation
    /// fails. On success the transaction enters the pending map and its
    /// id is recorded as seen.
    pub fn add(&self, tx: Transaction) -> Result<()> {
        tx.validate_basic()?;

        let mut inner = self.inner.lock();
        if inner.seen.contains(&tx.tx_id) {
            trace!(tx_id = %tx.tx_id, "rejecting already-seen transaction");
            return Err(MempoolError::AlreadySeen);
        }

        debug!(tx_id = %tx.tx_id, sender = %tx.sender, recipient = %tx.recipient, "admitted transaction");
        inner.seen.insert(tx.tx_id);
        inner.order.push_back(tx.tx_id);
        inner.by_id.insert(tx.tx_id, tx);
        Ok(())
    }

    /// Returns up to `n` pending transactions in insertion order without
    /// removing them. Removal happens only on commit.
    pub fn take(&self, n: usize) -> Vec<Transaction> {
        let inner = self.inner.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.by_id.get(id))
            .take(n)
            .cloned()
            .collect()
    }

    /// Removes committed transactions from the pending map and records
    /// their ids as seen. Unknown ids are a silent no-op (the seen mark
    /// still lands, covering transactions learned through sync).
    pub fn remove_committed(&self, tx_ids: &[H256]) {
        let mut inner = self.inner.lock();
        for id in tx_ids {
            inner.by_id.remove(id);
            inner.seen.insert(*id);
        }
        let PoolInner { by_id, order, .. } = &mut *inner;
        order.retain(|id| by_id.contains_key(id));
    }

    /// True when the id was ever admitted or observed committed.
    pub fn has_seen(&self, tx_id: &H256) -> bool {
        self.inner.lock().seen.contains(tx_id)
    }

    /// Number of pending transactions.
    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    /// True when no transactions are pending.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_id.is_empty()
    }

    /// All pending transactions in insertion order.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.take(usize::MAX)
    }

    /// Operator clear: drops all pending transactions. The seen history
    /// is preserved so cleared ids still cannot be re-gossiped in.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_id.clear();
        inner.order.clear();
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}
