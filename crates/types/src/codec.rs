//! Canonical binary encoding.
//!
//! Every hash preimage and every wire frame payload uses the same
//! encoder: MessagePack with named fields (`to_vec_named`), which writes
//! self-describing maps whose key order follows struct declaration
//! order. Integers, floats, byte strings, and text strings all carry
//! distinct type tags, so the encoding of a value is byte-stable across
//! nodes and platforms.

use crate::Result;
use serde::{Deserialize, Serialize};

/// Encodes a value with the canonical MessagePack encoding.
pub fn to_canonical_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decodes a value previously produced by [`to_canonical_vec`].
pub fn from_canonical_slice<'a, T: Deserialize<'a>>(buf: &'a [u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        value: u64,
        weight: f64,
    }

    #[test]
    fn roundtrip_preserves_value() {
        let sample = Sample {
            name: "alice".into(),
            value: 42,
            weight: 1.5,
        };
        let encoded = to_canonical_vec(&sample).unwrap();
        let decoded: Sample = from_canonical_slice(&encoded).unwrap();
        assert_eq!(sample, decoded);
    }

    #[test]
    fn encoding_is_stable() {
        let sample = Sample {
            name: "bob".into(),
            value: 7,
            weight: 0.25,
        };
        assert_eq!(
            to_canonical_vec(&sample).unwrap(),
            to_canonical_vec(&sample).unwrap()
        );
    }
}
