//! # MiniChain P2P
//!
//! Peer networking over plain TCP with length-prefixed frames.
//!
//! The [`NetworkService`] owns a listener and one dial loop per
//! configured peer; every live connection gets a reader task (frames in,
//! decoded and forwarded as [`NetworkEvent`]s) and a writer task
//! draining that peer's bounded [`queue::OutboundQueue`]. Send
//! operations are non-blocking handoffs to those queues - on overflow
//! the oldest non-consensus message is dropped, while PROPOSE/ACK/COMMIT
//! are never dropped and surface backpressure instead.
//!
//! Outbound dials that fail are retried with exponential backoff
//! (1 s doubling to a 30 s cap, ±20 % jitter).

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod queue;
pub mod registry;
pub mod service;

pub use queue::OutboundQueue;
pub use registry::{Direction, PeerConn, PeerRegistry, PeerStatus};
pub use service::{NetworkConfig, NetworkEvent, NetworkHandle, NetworkService, PeerAddr};

/// Result type alias for network operations
pub type Result<T> = std::result::Result<T, NetworkError>;

/// Errors that can occur in network operations
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Outbound queue is full of consensus-critical traffic
    #[error("backpressure on connection to {peer}")]
    Backpressure {
        /// Address of the congested peer
        peer: String,
    },

    /// Connection is shutting down
    #[error("connection to {peer} is closed")]
    ConnectionClosed {
        /// Address of the closed peer
        peer: String,
    },

    /// Identity could not be resolved to a connection or a configured
    /// peer address
    #[error("no route to {0}")]
    NoRoute(String),

    /// Dial failed at the socket level
    #[error("dial {addr}: {source}")]
    Dial {
        /// Address dialed
        addr: String,
        /// Underlying socket error
        source: std::io::Error,
    },

    /// Dial exceeded the connect timeout
    #[error("dial {addr}: timed out")]
    DialTimeout {
        /// Address dialed
        addr: String,
    },

    /// Framing or codec failure
    #[error("wire: {0}")]
    Wire(#[from] minichain_wire::WireError),

    /// Listener or socket I/O failure
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
