//! Saving a captured world to disk.

pub mod archive;
pub mod settings;
pub mod sled_db;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bedrock_net::ChunkPos;
use tracing::{error, info, warn};

use crate::column::Chunk;
use crate::dimension::Dimension;
use crate::nbt::Compound;
use crate::state::WorldState;

pub use archive::{ARCHIVE_EXTENSION, zip_folder};
pub use settings::{GameRules, LevelSettings};
pub use sled_db::SledWorldDb;

/// Errors raised while saving a world.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The world database failed.
    #[error("world database error: {0}")]
    Database(#[from] sled::Error),

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive could not be written.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Settings could not be serialized.
    #[error("failed to serialize level settings: {0}")]
    SerializeSettings(#[from] ron::Error),

    /// Settings file is malformed.
    #[error("failed to parse level settings: {0}")]
    ParseSettings(#[from] ron::error::SpannedError),
}

/// Storage for a saved world.
pub trait WorldDatabase {
    /// Write one column's slices and biome data.
    fn save_column(
        &mut self,
        dimension: Dimension,
        pos: ChunkPos,
        chunk: &Chunk,
    ) -> Result<(), PersistError>;

    /// Write the block entities of one column.
    fn save_block_nbt(
        &mut self,
        dimension: Dimension,
        pos: ChunkPos,
        tags: &[Compound],
    ) -> Result<(), PersistError>;

    /// Write the entities standing in one column.
    fn save_entities(
        &mut self,
        dimension: Dimension,
        pos: ChunkPos,
        entities: &[Compound],
    ) -> Result<(), PersistError>;

    fn load_settings(&self) -> Result<LevelSettings, PersistError>;

    fn save_settings(&mut self, settings: &LevelSettings) -> Result<(), PersistError>;

    /// Flush everything. The database must not be written afterwards.
    fn close(&mut self) -> Result<(), PersistError>;
}

/// Counts from a [`write_world`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub columns: usize,
    pub block_entity_columns: usize,
    pub entities: usize,
    pub failures: usize,
}

/// Settings for `state` on top of whatever the database already holds.
pub fn level_settings(state: &WorldState, mut settings: LevelSettings) -> LevelSettings {
    settings.level_name = if state.game.level_name.is_empty() {
        state.world_name()
    } else {
        state.game.level_name.clone()
    };
    settings.random_seed = state.game.seed;
    settings.spawn = state.game.spawn;
    settings.time = state.game.time;
    if !state.game.base_game_version.is_empty() {
        settings.base_game_version = state.game.base_game_version.clone();
    }
    settings.last_played = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64);
    for rule in state.game.game_rules.values() {
        settings.game_rules.apply(rule);
    }
    if state.void_generator {
        settings.use_void_generator();
    }
    settings
}

/// Write every part of `state` into `db`. A failing step is logged and
/// counted; later steps still run and earlier writes are kept.
pub fn write_world(state: &WorldState, db: &mut dyn WorldDatabase) -> WriteSummary {
    let mut summary = WriteSummary::default();
    let dimension = state.dimension;

    for (pos, chunk) in &state.chunks {
        match db.save_column(dimension, *pos, chunk) {
            Ok(()) => summary.columns += 1,
            Err(e) => {
                error!("Failed to save column {},{}: {e}", pos.x, pos.z);
                summary.failures += 1;
            }
        }
    }

    for (pos, tags) in state.block_nbt_by_column() {
        match db.save_block_nbt(dimension, pos, &tags) {
            Ok(()) => summary.block_entity_columns += 1,
            Err(e) => {
                error!("Failed to save block entities of {},{}: {e}", pos.x, pos.z);
                summary.failures += 1;
            }
        }
    }

    for (pos, entities) in state.entities_by_column() {
        let tags: Vec<Compound> = entities.iter().map(|e| e.to_nbt()).collect();
        match db.save_entities(dimension, pos, &tags) {
            Ok(()) => summary.entities += tags.len(),
            Err(e) => {
                error!("Failed to save entities of {},{}: {e}", pos.x, pos.z);
                summary.failures += 1;
            }
        }
    }

    let existing = db.load_settings().unwrap_or_else(|e| {
        warn!("Ignoring unreadable level settings: {e}");
        LevelSettings::default()
    });
    if let Err(e) = db.save_settings(&level_settings(state, existing)) {
        error!("Failed to save level settings: {e}");
        summary.failures += 1;
    }
    summary
}

/// Save `state` under `{output_dir}/{server}/{world}`, archive it as
/// `{world}.mcworld` next to the folder and remove the folder.
///
/// Fails only when the database cannot be opened or the archive cannot be
/// written; in both cases nothing is removed.
pub fn flush_world(state: &WorldState, output_dir: &Path) -> Result<PathBuf, PersistError> {
    let world_name = state.world_name();
    let server_dir = output_dir.join(&state.server_name);
    let folder = server_dir.join(&world_name);
    if folder.exists() {
        warn!(path = %folder.display(), "Replacing existing world folder");
        fs::remove_dir_all(&folder)?;
    }

    let mut db = SledWorldDb::open(&folder)?;
    let summary = write_world(state, &mut db);
    if let Err(e) = db.close() {
        error!("Failed to close world database: {e}");
    }
    drop(db);

    let dest = server_dir.join(format!("{world_name}.{ARCHIVE_EXTENSION}"));
    let files = zip_folder(&folder, &dest)?;
    if let Err(e) = fs::remove_dir_all(&folder) {
        warn!(path = %folder.display(), "Failed to remove world folder: {e}");
    }

    info!(
        world = %world_name,
        columns = summary.columns,
        entities = summary.entities,
        failures = summary.failures,
        files,
        "Saved world to {}",
        dest.display()
    );
    Ok(dest)
}
