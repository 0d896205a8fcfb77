//! Configuration for the Bedrock relay.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line via clap. Unknown or missing fields fall back to defaults so
//! older config files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{BlobCacheConfig, Config, DebugConfig, ProxyConfig, WorldConfig};
pub use error::ConfigError;
