use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Reference to one commit of a dataset's versioned log.
///
/// Revisions name the per-revision working directory in the cache
/// (`{cache_root}/{revision}`) and the per-revision push queue file, so they
/// are restricted to lowercase hex.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision(String);

impl Revision {
    /// Parse a revision reference.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Err(TypeError::InvalidLength {
                expected: 1,
                actual: 0,
            });
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidHex(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Derive a 40-char revision id from arbitrary commit material.
    pub fn derive(material: &[u8]) -> Self {
        let hex = blake3::hash(material).to_hex();
        Self(hex[..40].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log output.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Revision({})", self.short())
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Revision {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Revision> for String {
    fn from(rev: Revision) -> Self {
        rev.0
    }
}

impl std::str::FromStr for Revision {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_forty_hex_chars() {
        let rev = Revision::derive(b"commit material");
        assert_eq!(rev.as_str().len(), 40);
        assert_eq!(rev, Revision::derive(b"commit material"));
        assert_ne!(rev, Revision::derive(b"other material"));
    }

    #[test]
    fn parse_rejects_path_like_input() {
        assert!(Revision::parse("../etc").is_err());
        assert!(Revision::parse("").is_err());
        assert!(Revision::parse("abc123").is_ok());
    }

    #[test]
    fn short_is_prefix() {
        let rev = Revision::parse("0123456789abcdef").unwrap();
        assert_eq!(rev.short(), "01234567");
        let tiny = Revision::parse("abc").unwrap();
        assert_eq!(tiny.short(), "abc");
    }
}
