//! Cryptographic hashes for content addressing.
//!
//! Uses BLAKE3 for all hashing operations.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A BLAKE3 hash (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The number of bytes in a hash
    pub const LEN: usize = 32;

    /// Compute BLAKE3 hash of data
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create from bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to lowercase hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    ///
    /// # Errors
    ///
    /// Returns error if hex is invalid or not 32 bytes
    pub fn from_hex(hex: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(hex).map_err(|e| CoreError::InvalidHash {
            reason: e.to_string(),
        })?;
        let arr: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| CoreError::InvalidHash {
            reason: format!("length {} (expected 32)", b.len()),
        })?;
        Ok(Self(arr))
    }

    /// Chain this hash with a counter.
    ///
    /// Computes: hash(self || counter_le)
    #[must_use]
    pub fn chain_counter(&self, counter: u32) -> Self {
        let mut hasher = Hasher::new();
        hasher.update_raw(&self.0);
        hasher.update_raw(&counter.to_le_bytes());
        hasher.finalize()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Incremental hasher over framed fields.
///
/// Every field is prefixed with its length so that `("ab", "c")` and
/// `("a", "bc")` never collide.
pub struct Hasher {
    inner: blake3::Hasher,
}

impl Hasher {
    /// Create a new hasher
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
        }
    }

    /// Absorb a length-prefixed field
    pub fn update_field(&mut self, bytes: &[u8]) -> &mut Self {
        self.inner.update(&(bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    /// Absorb a fixed-width count
    pub fn update_count(&mut self, count: usize) -> &mut Self {
        self.inner.update(&(count as u64).to_le_bytes());
        self
    }

    fn update_raw(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }

    /// Finish hashing
    #[must_use]
    pub fn finalize(&self) -> Hash {
        Hash(*self.inner.finalize().as_bytes())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}
