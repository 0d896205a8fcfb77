//! Command-line argument parsing for the relay binary.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Relay command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(
    name = "bedrock-proxy",
    about = "Relay a Bedrock client to a server and capture the worlds it streams"
)]
pub struct CliArgs {
    /// Game server address (host:port).
    #[arg(long)]
    pub upstream: Option<String>,

    /// Address to accept the game client on.
    #[arg(long)]
    pub listen: Option<String>,

    /// Server display name, used for the world output folder.
    #[arg(long)]
    pub server_name: Option<String>,

    /// Directory that receives saved worlds.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Save worlds with a void generator.
    #[arg(long = "void")]
    pub void_generator: Option<bool>,

    /// Save entities with the world.
    #[arg(long)]
    pub entities: Option<bool>,

    /// Entity type to leave out of saved worlds; may be repeated.
    #[arg(long = "exclude-mob")]
    pub exclude_mobs: Vec<String>,

    /// Write a map image next to each saved world.
    #[arg(long)]
    pub save_image: bool,

    /// Blob cache directory.
    #[arg(long)]
    pub blob_cache: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.upstream {
            self.proxy.upstream_address = addr.clone();
        }
        if let Some(ref addr) = args.listen {
            self.proxy.listen_address = addr.clone();
        }
        if let Some(ref name) = args.server_name {
            self.proxy.server_name = name.clone();
        }
        if let Some(ref dir) = args.output {
            self.world.output_dir = dir.clone();
        }
        if let Some(void) = args.void_generator {
            self.world.void_generator = void;
        }
        if let Some(entities) = args.entities {
            self.world.save_entities = entities;
        }
        if !args.exclude_mobs.is_empty() {
            self.world.excluded_mobs = args.exclude_mobs.clone();
        }
        if args.save_image {
            self.world.save_image = true;
        }
        if let Some(ref path) = args.blob_cache {
            self.blob_cache.path = path.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
