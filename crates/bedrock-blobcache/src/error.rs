//! Blob cache error types.

/// Errors raised by the blob store and the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum BlobCacheError {
    /// The underlying sled database failed.
    #[error("blob store error: {0}")]
    Database(#[from] sled::Error),

    /// Neither the persistent nor the in-memory store could be opened.
    #[error("failed to open any blob store: {0}")]
    Unavailable(#[source] sled::Error),
}
