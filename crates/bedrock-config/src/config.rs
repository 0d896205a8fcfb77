//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the config file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Listener and upstream connection settings.
    pub proxy: ProxyConfig,
    /// Content-addressed blob cache settings.
    pub blob_cache: BlobCacheConfig,
    /// World capture settings.
    pub world: WorldConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Listener and upstream connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the relay accepts the game client on.
    pub listen_address: String,
    /// Address of the game server to relay to.
    pub upstream_address: String,
    /// Display name of the server, used as the output folder for worlds.
    pub server_name: String,
    /// Largest frame accepted from either peer, in bytes.
    pub max_frame_size: u32,
    /// Codec version byte expected on every packet.
    pub codec_version: u8,
    /// Reason sent to the peer that is still connected when a session ends.
    pub disconnect_reason: String,
}

/// Blob cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlobCacheConfig {
    /// Directory of the persistent blob store. Empty means the platform cache dir.
    pub path: PathBuf,
    /// Maximum number of miss hashes requested from the server at once.
    pub max_inflight: usize,
    /// Queue miss requests beyond `max_inflight` instead of sending them.
    pub enforce_inflight_cap: bool,
    /// Replaying a recorded capture: waiters are not tracked, so unknown
    /// blobs in miss responses are expected.
    pub replay: bool,
}

/// World capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Directory that receives `.mcworld` archives.
    pub output_dir: PathBuf,
    /// Save worlds with a void flat generator.
    pub void_generator: bool,
    /// Skip columns that contain nothing but air when saving.
    pub cull_empty_chunks: bool,
    /// Track entities and save them with the world.
    pub save_entities: bool,
    /// Entity types left out of saved worlds. `*` and `?` act as wildcards,
    /// e.g. `minecraft:zombie*`.
    pub excluded_mobs: Vec<String>,
    /// Write a top-down PNG of the captured area next to each archive.
    pub save_image: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for JSON log files in debug builds.
    pub log_dir: PathBuf,
}

// --- Default implementations ---

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:19132".to_string(),
            upstream_address: "127.0.0.1:19133".to_string(),
            server_name: "server".to_string(),
            max_frame_size: 16 * 1024 * 1024,
            codec_version: 1,
            disconnect_reason: "Connection Lost".to_string(),
        }
    }
}

impl Default for BlobCacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            max_inflight: 90,
            enforce_inflight_cap: true,
            replay: false,
        }
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("worlds"),
            void_generator: false,
            cull_empty_chunks: false,
            save_entities: true,
            excluded_mobs: Vec::new(),
            save_image: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl BlobCacheConfig {
    /// Directory the blob store should be opened in.
    ///
    /// Falls back to `<cache dir>/bedrock-relay/blobcache`, or a relative
    /// `blobcache` directory when the platform has no cache dir.
    pub fn resolved_path(&self) -> PathBuf {
        if !self.path.as_os_str().is_empty() {
            return self.path.clone();
        }
        dirs::cache_dir()
            .map(|dir| dir.join("bedrock-relay").join("blobcache"))
            .unwrap_or_else(|| PathBuf::from("blobcache"))
    }
}

// --- Load / Save ---

impl Config {
    /// Default config directory: `<config dir>/bedrock-relay`.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("bedrock-relay"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let contents =
                std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
                    path: config_path.clone(),
                    source,
                })?;
            let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: config_path.clone(),
                source,
            })?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })?;
        Ok(())
    }
}
