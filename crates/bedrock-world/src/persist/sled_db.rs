//! World database on sled with Bedrock-style keys.
//!
//! Column keys are `x (i32 LE) | z (i32 LE) | [dimension (i32 LE)] | tag`,
//! the dimension omitted for the overworld. Slice keys append the slice
//! index byte. Values are not byte-compatible with the game's LevelDB.

use std::fs;
use std::path::{Path, PathBuf};

use bedrock_net::ChunkPos;
use tracing::debug;

use super::settings::LevelSettings;
use super::{PersistError, WorldDatabase};
use crate::column::{Biomes, Chunk};
use crate::dimension::Dimension;
use crate::nbt::{Compound, NbtEncoding, write_compound};

pub const TAG_DATA_3D: u8 = 0x2B;
pub const TAG_CHUNK_VERSION: u8 = 0x2C;
pub const TAG_DATA_2D: u8 = 0x2D;
pub const TAG_SUB_CHUNK_PREFIX: u8 = 0x2F;
pub const TAG_BLOCK_ENTITY: u8 = 0x31;
pub const TAG_ENTITY: u8 = 0x32;
pub const TAG_FINALIZED_STATE: u8 = 0x36;

/// Chunk format version written for every column.
pub const CHUNK_VERSION: u8 = 40;
/// Finalized state meaning "fully generated".
const FINALIZED_DONE: i32 = 2;

/// Settings file inside the world folder.
pub const SETTINGS_FILE: &str = "level.ron";
/// Display name file inside the world folder.
pub const LEVEL_NAME_FILE: &str = "levelname.txt";
/// Database directory inside the world folder.
pub const DB_DIR: &str = "db";

/// Key for a per-column record.
pub fn chunk_key(pos: ChunkPos, dimension: Dimension, tag: u8) -> Vec<u8> {
    let mut key = Vec::with_capacity(13);
    key.extend_from_slice(&pos.x.to_le_bytes());
    key.extend_from_slice(&pos.z.to_le_bytes());
    if dimension != Dimension::Overworld {
        key.extend_from_slice(&dimension.id().to_le_bytes());
    }
    key.push(tag);
    key
}

/// Key for one slice of a column.
pub fn sub_chunk_key(pos: ChunkPos, dimension: Dimension, y_index: i8) -> Vec<u8> {
    let mut key = chunk_key(pos, dimension, TAG_SUB_CHUNK_PREFIX);
    key.push(y_index as u8);
    key
}

fn concat_nbt(tags: &[Compound]) -> Vec<u8> {
    let mut out = Vec::new();
    for tag in tags {
        write_compound(&mut out, tag, NbtEncoding::LittleEndian);
    }
    out
}

/// A world folder holding a sled database plus settings files.
pub struct SledWorldDb {
    folder: PathBuf,
    db: sled::Db,
}

impl SledWorldDb {
    /// Open or create the world at `folder`.
    pub fn open(folder: &Path) -> Result<Self, PersistError> {
        fs::create_dir_all(folder)?;
        let db = sled::open(folder.join(DB_DIR))?;
        debug!(path = %folder.display(), "Opened world database");
        Ok(Self {
            folder: folder.to_path_buf(),
            db,
        })
    }

    /// World folder.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Raw value lookup.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.db.get(key)?.map(|v| v.to_vec()))
    }
}

impl WorldDatabase for SledWorldDb {
    fn save_column(
        &mut self,
        dimension: Dimension,
        pos: ChunkPos,
        chunk: &Chunk,
    ) -> Result<(), PersistError> {
        self.db
            .insert(chunk_key(pos, dimension, TAG_CHUNK_VERSION), &[CHUNK_VERSION][..])?;
        let biome_tag = match chunk.biomes() {
            Biomes::Legacy(_) => TAG_DATA_2D,
            Biomes::Modern(_) | Biomes::Absent => TAG_DATA_3D,
        };
        self.db
            .insert(chunk_key(pos, dimension, biome_tag), chunk.encode_biomes())?;
        for (y, sub) in chunk.sub_chunks() {
            if sub.is_empty(chunk.air()) {
                continue;
            }
            let y = y as i8;
            self.db
                .insert(sub_chunk_key(pos, dimension, y), sub.encode(y))?;
        }
        self.db.insert(
            chunk_key(pos, dimension, TAG_FINALIZED_STATE),
            &FINALIZED_DONE.to_le_bytes()[..],
        )?;
        Ok(())
    }

    fn save_block_nbt(
        &mut self,
        dimension: Dimension,
        pos: ChunkPos,
        tags: &[Compound],
    ) -> Result<(), PersistError> {
        if tags.is_empty() {
            return Ok(());
        }
        self.db
            .insert(chunk_key(pos, dimension, TAG_BLOCK_ENTITY), concat_nbt(tags))?;
        Ok(())
    }

    fn save_entities(
        &mut self,
        dimension: Dimension,
        pos: ChunkPos,
        entities: &[Compound],
    ) -> Result<(), PersistError> {
        if entities.is_empty() {
            return Ok(());
        }
        self.db
            .insert(chunk_key(pos, dimension, TAG_ENTITY), concat_nbt(entities))?;
        Ok(())
    }

    fn load_settings(&self) -> Result<LevelSettings, PersistError> {
        let path = self.folder.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(LevelSettings::default());
        }
        let text = fs::read_to_string(&path)?;
        Ok(ron::from_str(&text)?)
    }

    fn save_settings(&mut self, settings: &LevelSettings) -> Result<(), PersistError> {
        let text = ron::ser::to_string_pretty(settings, ron::ser::PrettyConfig::default())?;
        fs::write(self.folder.join(SETTINGS_FILE), text)?;
        fs::write(self.folder.join(LEVEL_NAME_FILE), &settings.level_name)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PersistError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nbt::{NbtValue, read_all};

    #[test]
    fn test_overworld_key_omits_dimension() {
        let key = chunk_key(ChunkPos::new(1, -1), Dimension::Overworld, TAG_CHUNK_VERSION);
        assert_eq!(key, [1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff, 0x2C]);
    }

    #[test]
    fn test_nether_sub_chunk_key() {
        let key = sub_chunk_key(ChunkPos::new(0, 2), Dimension::Nether, -4);
        assert_eq!(key, [0, 0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 0x2F, 0xfc]);
    }

    #[test]
    fn test_column_and_nbt_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = SledWorldDb::open(&dir.path().join("world-0")).unwrap();
        let pos = ChunkPos::new(3, 4);
        let chunk = Chunk::new(Dimension::Overworld.range(false), 0);
        db.save_column(Dimension::Overworld, pos, &chunk).unwrap();

        let mut chest = Compound::new();
        chest.insert("id".into(), NbtValue::String("Chest".into()));
        db.save_block_nbt(Dimension::Overworld, pos, std::slice::from_ref(&chest))
            .unwrap();
        db.save_entities(Dimension::Overworld, pos, &[]).unwrap();

        assert_eq!(
            db.get(&chunk_key(pos, Dimension::Overworld, TAG_CHUNK_VERSION))
                .unwrap(),
            Some(vec![CHUNK_VERSION])
        );
        // all-air slices are not written
        assert_eq!(
            db.get(&sub_chunk_key(pos, Dimension::Overworld, 0)).unwrap(),
            None
        );
        let stored = db
            .get(&chunk_key(pos, Dimension::Overworld, TAG_BLOCK_ENTITY))
            .unwrap()
            .unwrap();
        assert_eq!(read_all(&stored, NbtEncoding::LittleEndian).unwrap(), vec![chest]);
        assert_eq!(
            db.get(&chunk_key(pos, Dimension::Overworld, TAG_ENTITY)).unwrap(),
            None
        );
        db.close().unwrap();
    }

    #[test]
    fn test_settings_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut db = SledWorldDb::open(dir.path()).unwrap();
        assert_eq!(db.load_settings().unwrap(), LevelSettings::default());

        let mut settings = LevelSettings::default();
        settings.level_name = "Hub".into();
        settings.use_void_generator();
        db.save_settings(&settings).unwrap();

        assert_eq!(db.load_settings().unwrap(), settings);
        assert_eq!(
            fs::read_to_string(dir.path().join(LEVEL_NAME_FILE)).unwrap(),
            "Hub"
        );
    }
}
