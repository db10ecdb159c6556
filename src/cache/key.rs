//! Cache key derivation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Content-addressed cache key: the lowercase hex SHA-256 of a payload,
/// optionally prefixed with a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub hash: String,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }

    /// Key for a raw payload.
    pub fn for_payload(payload: &[u8]) -> Self {
        Self::new(hex_digest(Sha256::digest(payload).as_slice()))
    }

    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Derives keys for payloads, with an optional salt mixed into the digest
/// and an optional prefix in front of it.
///
/// Two generators with different salts never share entries in one store.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    prefix: Option<String>,
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    pub fn generate(&self, payload: &[u8]) -> CacheKey {
        let mut hasher = Sha256::new();
        if let Some(ref salt) = self.salt {
            hasher.update(salt.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(payload);
        let digest = hex_digest(hasher.finalize().as_slice());
        match self.prefix {
            Some(ref prefix) => CacheKey::new(format!("{}:{}", prefix, digest)),
            None => CacheKey::new(digest),
        }
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
