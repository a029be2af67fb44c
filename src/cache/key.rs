//! Cache key derivation from dependency descriptors
//!
//! The key is a SHA256 digest of the descriptor contents concatenated in
//! list order. Only bytes are hashed: no paths, timestamps or metadata, so
//! the same descriptors always produce the same key.

use crate::error::{KilnError, KilnResult};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// Number of hex characters kept from the digest
pub const KEY_LEN: usize = 12;

/// Opaque fixed-length cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key of an in-memory byte sequence
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self::from_hasher(hasher)
    }

    fn from_hasher(hasher: Sha256) -> Self {
        let hash = hex::encode(hasher.finalize());
        Self(hash[..KEY_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the cache key for an ordered list of descriptor files
///
/// Fails with `DescriptorUnreadable` if any descriptor is missing or
/// unreadable; no partial key is produced.
pub async fn derive_key(descriptors: &[PathBuf]) -> KilnResult<CacheKey> {
    let mut hasher = Sha256::new();

    for path in descriptors {
        let contents = fs::read(path)
            .await
            .map_err(|e| KilnError::DescriptorUnreadable {
                path: path.clone(),
                source: e,
            })?;
        hasher.update(&contents);
    }

    let key = CacheKey::from_hasher(hasher);
    debug!("Derived cache key {} from {} descriptor(s)", key, descriptors.len());
    Ok(key)
}
