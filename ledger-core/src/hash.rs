//! Content and transaction hashes
//!
//! - Content hashes: SHA-256 over the canonical bincode encoding. Stable for
//!   a given value, used for proposal hashes.
//! - Transaction hashes: BLAKE3 over `(sequence, kind, payload)`. Every
//!   committed command gets one, so receipts and `executionTxHash` are unique.

use crate::Result;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// 32-byte hash, `0x`-prefixed hex on the wire
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash32([u8; 32]);

impl Hash32 {
    /// Wrap raw bytes
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x`-prefixed lower-case hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Parse `0x`-prefixed or bare hex
    pub fn from_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits).ok()?;
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(arr))
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({})", &self.to_hex()[..10])
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Hash32::from_hex(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid hash {:?}", s)))
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Hash32)
        }
    }
}

/// SHA-256 of the canonical encoding of `value`
pub fn content_hash<T: Serialize>(value: &T) -> Result<Hash32> {
    let encoded = bincode::serialize(value)?;
    let digest = Sha256::digest(&encoded);
    Ok(Hash32(digest.into()))
}

/// BLAKE3 transaction hash for the command committed at `sequence`
pub fn transaction_hash(sequence: u64, kind: &str, payload: &[u8]) -> Hash32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&sequence.to_be_bytes());
    hasher.update(kind.as_bytes());
    hasher.update(&[0u8]);
    hasher.update(payload);
    Hash32(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Content {
        title: String,
        value: u64,
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = Content { title: "raise fee".into(), value: 35 };
        let b = Content { title: "raise fee".into(), value: 35 };
        let c = Content { title: "raise fee".into(), value: 36 };

        assert_eq!(content_hash(&a).unwrap(), content_hash(&b).unwrap());
        assert_ne!(content_hash(&a).unwrap(), content_hash(&c).unwrap());
    }

    #[test]
    fn test_transaction_hash_depends_on_sequence() {
        let a = transaction_hash(1, "cast_vote", b"payload");
        let b = transaction_hash(2, "cast_vote", b"payload");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_roundtrip() {
        let h = transaction_hash(7, "create_pool", &[]);
        let hex = h.to_hex();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 66);
        assert_eq!(Hash32::from_hex(&hex), Some(h));

        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", hex));
    }
}
