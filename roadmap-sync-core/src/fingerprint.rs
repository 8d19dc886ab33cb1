//! Short content fingerprints used to detect no-op runs.
//!
//! Fingerprints only need to be stable within one deployment: the mapping file
//! is local and is never compared against fingerprints produced elsewhere.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters kept from the SHA-256 digest.
pub const FINGERPRINT_LEN: usize = 16;

/// Truncated, hex-encoded SHA-256 digest of a feature's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Fingerprint(s)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Fingerprint(s.to_string())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a single unit of content.
pub fn fingerprint(content: &[u8]) -> Fingerprint {
    fingerprint_parts(&[content])
}

/// Fingerprint several parts as one unit. Each part is length-prefixed so
/// `["ab", "c"]` and `["a", "bc"]` never collide.
pub fn fingerprint_parts(parts: &[&[u8]]) -> Fingerprint {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(FINGERPRINT_LEN);
    Fingerprint(hex)
}
