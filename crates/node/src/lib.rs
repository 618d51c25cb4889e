//! # MiniChain Node
//!
//! The orchestrator gluing transport, mempool, chain store, and the
//! consensus engine into a running validator.
//!
//! One dispatch task consumes decoded network events and handles them
//! one at a time, serializing all state transitions; a 1 Hz tick drives
//! proposals; a heartbeat task announces liveness and chain position.
//! Operator-facing read/submit accessors never block on I/O beyond the
//! mempool and chain locks.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod node;
mod sync;

pub use node::{Node, NodeError};

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;
