//! Content-addressed blob cache for chunk traffic.
//!
//! [`BlobStore`] persists blobs across runs; [`BlobCache`] rebuilds chunk and
//! sub-chunk packets that reference blobs, coordinating with the server and
//! with a client that may keep its own cache.

pub mod carrier;
pub mod engine;
pub mod error;
pub mod store;

pub use carrier::{BlobCarrier, Skeleton};
pub use engine::{BlobCache, CacheOutcome, CacheStats, WaitId};
pub use error::BlobCacheError;
pub use store::{BlobStore, blob_key};
