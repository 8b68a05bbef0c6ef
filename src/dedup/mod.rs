//! Content deduplication by exact byte fingerprint.
//!
//! Two downloads with identical bytes are the same image no matter which URL
//! or title they arrived under. The [`Ledger`] remembers every fingerprint ever
//! accepted and hands out the sequence numbers that name stored files.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub mod ledger;

pub use ledger::Ledger;

/// Lowercase hex SHA-256 digest of an image's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a byte buffer.
    #[must_use]
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
