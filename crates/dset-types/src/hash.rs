use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Minimum digest length: the object store shards on the first 16 hex chars.
pub const MIN_HASH_LEN: usize = 16;

/// Full content hash of a file, used as the object-store key.
///
/// Stored as lowercase hex. Identical bytes always produce the same
/// `ContentHash`, which is what makes objects deduplicatable. The string form
/// is kept instead of a fixed-width array so caches written with a different
/// digest width stay readable.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Compute the BLAKE3 digest of an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(blake3::hash(data).to_hex().to_string())
    }

    /// Wrap a finished BLAKE3 hasher.
    pub fn from_blake3(hash: blake3::Hash) -> Self {
        Self(hash.to_hex().to_string())
    }

    /// Parse from a hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        if s.len() < MIN_HASH_LEN {
            return Err(TypeError::InvalidLength {
                expected: MIN_HASH_LEN,
                actual: s.len(),
            });
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidHex(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// The hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Two-level shard prefix: `(hash[0:8], hash[8:16])`.
    pub fn shard(&self) -> (&str, &str) {
        (&self.0[..8], &self.0[8..16])
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.short_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

impl std::str::FromStr for ContentHash {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn of_bytes_is_deterministic() {
        assert_eq!(ContentHash::of_bytes(b"hello"), ContentHash::of_bytes(b"hello"));
        assert_ne!(ContentHash::of_bytes(b"hello"), ContentHash::of_bytes(b"world"));
    }

    #[test]
    fn blake3_digest_is_64_hex_chars() {
        let h = ContentHash::of_bytes(b"test");
        assert_eq!(h.as_str().len(), 64);
        assert_eq!(h.to_string(), h.as_str());
    }

    #[test]
    fn shard_splits_first_sixteen_chars() {
        let h = ContentHash::from_hex("0123456789abcdef0011").unwrap();
        assert_eq!(h.shard(), ("01234567", "89abcdef"));
    }

    #[test]
    fn from_hex_lowercases() {
        let h = ContentHash::from_hex("ABCDEF0123456789").unwrap();
        assert_eq!(h.as_str(), "abcdef0123456789");
    }

    #[test]
    fn from_hex_rejects_short_and_non_hex() {
        assert!(matches!(
            ContentHash::from_hex("abc"),
            Err(TypeError::InvalidLength { .. })
        ));
        assert!(matches!(
            ContentHash::from_hex("zzzzzzzzzzzzzzzzzz"),
            Err(TypeError::InvalidHex(_))
        ));
    }

    #[test]
    fn serde_uses_plain_string() {
        let h = ContentHash::of_bytes(b"serde");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{h}\""));
        let parsed: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn serde_rejects_invalid_hash() {
        assert!(serde_json::from_str::<ContentHash>("\"nothex!\"").is_err());
    }
}
