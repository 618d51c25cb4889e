//! 32-byte hash type backed by SHA-256.
//!
//! `H256` serializes as a lowercase 64-character hex string in every
//! context (wire frames, the persisted chain file, log records), matching
//! the protocol's text rendering of digests.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 256-bit hash value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct H256([u8; 32]);

impl H256 {
    /// The all-zero hash, used as the genesis parent (`"0" * 64`).
    pub const ZERO: H256 = H256([0u8; 32]);

    /// Computes the SHA-256 digest of `data`.
    pub fn sha256(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        H256(bytes)
    }

    /// Creates a hash from a 32-byte slice.
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != 32 {
            return Err(Error::InvalidHashLength(slice.len()));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(H256(bytes))
    }

    /// Parses a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s)?;
        Self::from_slice(&raw)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Renders the hash as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// True for the all-zero hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Short prefix for log records (first 8 hex chars).
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl From<[u8; 32]> for H256 {
    fn from(bytes: [u8; 32]) -> Self {
        H256(bytes)
    }
}

impl fmt::Display for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for H256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "H256({})", self.to_hex())
    }
}

impl Serialize for H256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for H256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        H256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        let a = H256::sha256(b"minichain");
        let b = H256::sha256(b"minichain");
        assert_eq!(a, b);
        assert_ne!(a, H256::sha256(b"minichain2"));
    }

    #[test]
    fn hex_roundtrip() {
        let h = H256::sha256(b"roundtrip");
        let parsed = H256::from_hex(&h.to_hex()).unwrap();
        assert_eq!(h, parsed);
        assert_eq!(h.to_hex().len(), 64);
    }

    #[test]
    fn zero_is_sixty_four_zeros() {
        assert!(H256::ZERO.is_zero());
        assert_eq!(H256::ZERO.to_hex(), "0".repeat(64));
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(H256::from_slice(&[0u8; 31]).is_err());
        assert!(H256::from_hex("abcd").is_err());
    }
}
