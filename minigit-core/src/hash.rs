//! Content identity using SHA-256.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Hex-encoded SHA-256 digest identifying a blob or a commit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub const HEX_LEN: usize = 64;

    /// Digest of arbitrary bytes.
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ObjectId(hex::encode(hasher.finalize()))
    }

    /// Parses a stored id, rejecting anything that is not a full lowercase hex digest.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = s.len() == Self::HEX_LEN
            && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| ObjectId(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        self.0.get(..10).unwrap_or(&self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(ObjectId::of(b"hello world"), ObjectId::of(b"hello world"));
    }

    #[test]
    fn test_hash_different_inputs() {
        assert_ne!(ObjectId::of(b"hello"), ObjectId::of(b"world"));
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            ObjectId::of(b"").as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_parse() {
        let id = ObjectId::of(b"x");
        assert_eq!(ObjectId::parse(id.as_str()), Some(id.clone()));
        assert_eq!(id.short().len(), 10);
        assert!(ObjectId::parse("abc").is_none());
        assert!(ObjectId::parse(&id.as_str().to_uppercase()).is_none());
    }
}
