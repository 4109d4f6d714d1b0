//! Checksum utilities for registry integrity and fingerprint identification

use sha2::{Digest, Sha256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a hex-encoded SHA256 checksum.
pub const CHECKSUM_HEX_LEN: usize = 64;

/// SHA256 checksum, hex encoded
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Compute checksum from raw bytes
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(format!("{:x}", hash))
    }

    /// Get the hex string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading hex digits, enough to tell fingerprints apart in logs
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// Verify that data matches this checksum
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::from_bytes(data) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
