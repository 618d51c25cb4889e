//! # MiniChain Configuration
//!
//! Single-file TOML configuration (`minichain.toml`) covering node
//! identity, networking, consensus parameters, storage, and logging.
//! Values are validated on load; the peer list arrives pre-normalized
//! from the external launcher (one `host:port` per entry).

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

mod config;
mod error;

pub use config::{
    Config, ConsensusSection, LoggingSection, NetworkSection, NodeSection, PeerEntry,
    StorageSection,
};
pub use error::{ConfigError, ConfigResult};
