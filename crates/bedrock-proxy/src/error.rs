//! Relay errors.

use bedrock_blobcache::BlobCacheError;
use bedrock_config::ConfigError;
use bedrock_net::ConnError;
use bedrock_world::WorldError;

/// Errors that end a relay session or stop the listener.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// A peer connection failed.
    #[error(transparent)]
    Conn(#[from] ConnError),

    /// The blob cache failed.
    #[error("blob cache: {0}")]
    BlobCache(#[from] BlobCacheError),

    /// World capture failed.
    #[error("world capture: {0}")]
    World(#[from] WorldError),

    /// Configuration could not be loaded.
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    /// Socket or file system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
