//! World capture for the Bedrock relay.
//!
//! Decodes resolved chunk and sub-chunk payloads into columns, tracks
//! entities and game data, and saves the result as a `.mcworld` archive.

pub mod assembler;
pub mod column;
pub mod dimension;
pub mod nbt;
pub mod notify;
pub mod palette;
pub mod persist;
pub mod render;
pub mod state;
pub mod sub_chunk;
pub mod wire;

pub use assembler::{ChunkAssembler, WorldError, is_pre_118};
pub use column::{Biomes, Chunk, DecodedChunk};
pub use dimension::{Dimension, HeightRange};
pub use notify::{MapNotifier, NullNotifier};
pub use persist::{
    LevelSettings, PersistError, SledWorldDb, WorldDatabase, flush_world, write_world,
};
pub use state::{EntityRecord, GameData, MobFilter, PlayerPosition, WorldState};
pub use sub_chunk::SubChunk;
pub use wire::DecodeError;
