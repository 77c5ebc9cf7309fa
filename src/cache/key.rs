//! Content-addressed cache keys
//!
//! A cache key is the SHA256 digest of a transform's identity (its
//! inputs plus the transform definition). Same identity = same
//! workspace.

use crate::error::{TrestleError, TrestleResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;

/// Content hash identifying one transform invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Hash a single byte string
    pub fn of_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let mut builder = CacheKeyBuilder::new();
        builder.put_bytes(bytes);
        builder.build()
    }

    /// Re-hydrate a key from its hex form
    pub fn from_hex(hex_str: &str) -> TrestleResult<Self> {
        let bytes = hex::decode(hex_str).map_err(|e| {
            TrestleError::Internal(format!("invalid cache key '{hex_str}': {e}"))
        })?;
        let digest: [u8; 32] = bytes.try_into().map_err(|_| {
            TrestleError::Internal(format!("invalid cache key '{hex_str}': wrong length"))
        })?;
        Ok(Self(digest))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Incrementally hashes the parts of a transform identity
#[derive(Default)]
pub struct CacheKeyBuilder {
    hasher: Sha256,
}

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_bytes(&mut self, bytes: impl AsRef<[u8]>) -> &mut Self {
        let bytes = bytes.as_ref();
        // Length-prefix each part so ("ab","c") and ("a","bc") differ.
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
        self
    }

    pub fn put_str(&mut self, s: &str) -> &mut Self {
        self.put_bytes(s.as_bytes())
    }

    pub fn put_path(&mut self, path: &Path) -> &mut Self {
        self.put_bytes(path.to_string_lossy().as_bytes())
    }

    pub fn build(self) -> CacheKey {
        CacheKey(self.hasher.finalize().into())
    }
}
