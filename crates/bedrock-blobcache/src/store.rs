//! Content-addressed blob store backed by sled.
//!
//! Keys are the 8-byte little-endian encoding of the blob hash. A key is
//! written at most once; later writes of the same hash are ignored.

use std::path::Path;

use bedrock_net::BlobHash;
use sled::Db;
use tracing::{info, warn};

use crate::error::BlobCacheError;

/// Store key for a blob hash.
pub fn blob_key(hash: BlobHash) -> [u8; 8] {
    hash.to_le_bytes()
}

/// Persistent hash → payload store.
pub struct BlobStore {
    db: Db,
    persistent: bool,
}

impl BlobStore {
    /// Open the persistent store at `path`.
    pub fn open_persistent<P: AsRef<Path>>(path: P) -> Result<Self, BlobCacheError> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), blobs = db.len(), "Opened blob store");
        Ok(Self {
            db,
            persistent: true,
        })
    }

    /// Open a memory-only store. Contents are discarded on drop.
    pub fn in_memory() -> Result<Self, BlobCacheError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            db,
            persistent: false,
        })
    }

    /// Open the persistent store at `path`, degrading to memory-only when it
    /// cannot be opened (for example when another process holds the lock).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BlobCacheError> {
        match Self::open_persistent(path.as_ref()) {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!(
                    path = %path.as_ref().display(),
                    "Blob store unavailable ({e}), caching in memory for this run"
                );
                Self::in_memory().map_err(|e| match e {
                    BlobCacheError::Database(e) => BlobCacheError::Unavailable(e),
                    other => other,
                })
            }
        }
    }

    /// Whether blobs survive a restart.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Load a blob.
    pub fn get(&self, hash: BlobHash) -> Result<Option<Vec<u8>>, BlobCacheError> {
        Ok(self.db.get(blob_key(hash))?.map(|v| v.to_vec()))
    }

    /// Whether a blob is stored.
    pub fn contains(&self, hash: BlobHash) -> Result<bool, BlobCacheError> {
        Ok(self.db.contains_key(blob_key(hash))?)
    }

    /// Store a blob. Returns `false` when the hash was already present, in
    /// which case the stored payload is left untouched.
    pub fn put(&self, hash: BlobHash, payload: &[u8]) -> Result<bool, BlobCacheError> {
        let swapped = self
            .db
            .compare_and_swap(blob_key(hash), None::<&[u8]>, Some(payload))?;
        Ok(swapped.is_ok())
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Whether the store holds no blobs.
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), BlobCacheError> {
        self.db.flush()?;
        Ok(())
    }
}
