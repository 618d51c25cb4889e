//! Value-transfer transaction type.
//!
//! A transaction moves an [`Amount`] between two symbolic identities.
//! The `tx_id` is the SHA-256 of the canonical encoding of
//! `(sender, recipient, amount, timestamp)` - a pure function of those
//! four fields, so the same submission always derives the same id.

use crate::{codec, Error, Result, H256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transfer value in integer subunits.
///
/// Amounts are whole subunits rather than floating-point so the `tx_id`
/// preimage is byte-identical on every platform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero value.
    pub const ZERO: Amount = Amount(0);

    /// Creates an amount from raw subunits.
    pub const fn from_subunits(subunits: u64) -> Self {
        Amount(subunits)
    }

    /// Returns the raw subunit count.
    pub const fn subunits(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical preimage hashed into `tx_id`. Field order is the hash
/// contract; do not reorder.
#[derive(Serialize)]
struct TxPreimage<'a> {
    sender: &'a str,
    recipient: &'a str,
    amount: Amount,
    timestamp: f64,
}

/// A value transfer between two identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction id: SHA-256 over the canonical encoding of the
    /// remaining four fields
    pub tx_id: H256,
    /// Source identity
    pub sender: String,
    /// Destination identity
    pub recipient: String,
    /// Transfer value in subunits
    pub amount: Amount,
    /// Submission time, Unix seconds
    pub timestamp: f64,
}

impl Transaction {
    /// Creates a transaction, deriving its `tx_id`.
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: Amount,
        timestamp: f64,
    ) -> Self {
        let sender = sender.into();
        let recipient = recipient.into();
        let tx_id = Self::derive_id(&sender, &recipient, amount, timestamp);
        Self {
            tx_id,
            sender,
            recipient,
            amount,
            timestamp,
        }
    }

    /// Computes the id for the given fields.
    pub fn derive_id(sender: &str, recipient: &str, amount: Amount, timestamp: f64) -> H256 {
        let preimage = TxPreimage {
            sender,
            recipient,
            amount,
            timestamp,
        };
        // Encoding a flat struct of strings and numbers cannot fail.
        let bytes = codec::to_canonical_vec(&preimage).expect("transaction preimage encoding");
        H256::sha256(&bytes)
    }

    /// Recomputes the id from this transaction's fields.
    pub fn compute_id(&self) -> H256 {
        Self::derive_id(&self.sender, &self.recipient, self.amount, self.timestamp)
    }

    /// Validates structural rules: non-empty identities and a `tx_id`
    /// that recomputes to the stored value.
    pub fn validate_basic(&self) -> Result<()> {
        if self.sender.is_empty() {
            return Err(Error::EmptyIdentity("sender"));
        }
        if self.recipient.is_empty() {
            return Err(Error::EmptyIdentity("recipient"));
        }
        let computed = self.compute_id();
        if computed != self.tx_id {
            return Err(Error::TxIdMismatch {
                stored: self.tx_id,
                computed,
            });
        }
        Ok(())
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tx {{ {} -> {}: {} (id: {}) }}",
            self.sender,
            self.recipient,
            self.amount,
            self.tx_id.short()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_pure_function_of_fields() {
        let a = Transaction::new("alice", "bob", Amount::from_subunits(10), 1.0);
        let b = Transaction::new("alice", "bob", Amount::from_subunits(10), 1.0);
        assert_eq!(a.tx_id, b.tx_id);

        let c = Transaction::new("alice", "bob", Amount::from_subunits(10), 2.0);
        assert_ne!(a.tx_id, c.tx_id);
    }

    #[test]
    fn validate_rejects_tampered_id() {
        let mut tx = Transaction::new("alice", "bob", Amount::from_subunits(5), 1.0);
        tx.amount = Amount::from_subunits(500);
        assert!(matches!(
            tx.validate_basic(),
            Err(Error::TxIdMismatch { .. })
        ));
    }

    #[test]
    fn validate_rejects_empty_identities() {
        let tx = Transaction::new("", "bob", Amount::ZERO, 1.0);
        assert!(matches!(
            tx.validate_basic(),
            Err(Error::EmptyIdentity("sender"))
        ));
    }
}
