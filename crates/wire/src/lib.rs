//! # MiniChain Wire Protocol
//!
//! Everything that crosses a peer connection:
//! - [`Message`] - the tagged union of wire payloads, one variant per
//!   message `type`, encoded as a self-describing canonical MessagePack
//!   map with a `"type"` discriminator
//! - [`frame`] - 4-byte big-endian length-prefixed framing over any
//!   reliable byte stream
//!
//! The framing layer carries no acknowledgements; delivery ordering per
//! peer is inherited from the underlying stream.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod frame;
pub mod message;

pub use frame::{read_frame, read_message, write_frame, write_message, MAX_FRAME_BYTES};
pub use message::Message;

/// Result type alias for wire operations
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors produced by framing and message codec operations
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// A frame declared a length beyond the 16 MiB cap; fatal for the
    /// connection
    #[error("oversize frame: {len} bytes exceeds {max} byte limit")]
    OversizeFrame {
        /// Declared frame length
        len: usize,
        /// Enforced maximum
        max: usize,
    },

    /// The peer closed the stream or a read/write failed
    #[error("stream: {0}")]
    Io(#[from] std::io::Error),

    /// Payload bytes did not decode to a known message
    #[error("malformed message: {0}")]
    Malformed(#[from] minichain_types::Error),
}
