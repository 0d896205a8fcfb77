//! Relay binary.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p bedrock-proxy -- --upstream play.example.net:19132`.

use std::sync::Arc;

use bedrock_blobcache::{BlobCache, BlobStore};
use bedrock_config::{CliArgs, Config};
use bedrock_proxy::{ProxyError, ProxyListener};
use bedrock_world::NullNotifier;
use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), ProxyError> {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = match args.config.clone() {
        Some(dir) => dir,
        None => Config::default_dir()?,
    };

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join(&config.debug.log_dir);
    bedrock_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    let store_path = config.blob_cache.resolved_path();
    let store = BlobStore::open(&store_path)?;
    if store.is_persistent() {
        info!("Blob cache at {} holds {} blobs", store_path.display(), store.len());
    }
    let cache = Arc::new(BlobCache::new(store, config.blob_cache.clone()));

    info!(
        listen = %config.proxy.listen_address,
        upstream = %config.proxy.upstream_address,
        "Starting relay"
    );
    let listener = Arc::new(ProxyListener::new(config, cache, Arc::new(NullNotifier)));

    let on_signal = Arc::clone(&listener);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => on_signal.shutdown(),
            Err(e) => error!("Cannot listen for ctrl-c: {e}"),
        }
    });

    listener.run().await
}
