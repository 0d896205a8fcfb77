//! Accumulated world state for one capture.

use std::collections::BTreeMap;

use bedrock_net::{AddActor, ChunkPos, GameRule, MetadataValue, SubChunkPos};
use regex::RegexSet;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::column::Chunk;
use crate::dimension::Dimension;
use crate::nbt::{Compound, NbtValue};

/// Entity metadata key holding the variant.
pub const METADATA_VARIANT: u32 = 2;
/// Entity metadata key holding the colour index.
pub const METADATA_COLOUR: u32 = 3;
/// Entity metadata key holding the name tag.
pub const METADATA_NAME: u32 = 4;

/// Where the local player stands.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerPosition {
    /// Position in blocks.
    pub position: [f32; 3],
    pub pitch: f32,
    pub yaw: f32,
    pub head_yaw: f32,
}

impl PlayerPosition {
    /// Block X/Z under the player.
    pub fn block_xz(&self) -> (i32, i32) {
        (
            self.position[0].floor() as i32,
            self.position[2].floor() as i32,
        )
    }
}

/// A tracked entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub runtime_id: u64,
    pub unique_id: i64,
    pub entity_type: String,
    pub position: [f32; 3],
    pub velocity: [f32; 3],
    pub pitch: f32,
    pub yaw: f32,
    pub head_yaw: f32,
    pub body_yaw: f32,
    pub metadata: BTreeMap<u32, MetadataValue>,
}

impl From<&AddActor> for EntityRecord {
    fn from(pk: &AddActor) -> Self {
        Self {
            runtime_id: pk.runtime_id,
            unique_id: pk.unique_id,
            entity_type: pk.entity_type.clone(),
            position: pk.position,
            velocity: pk.velocity,
            pitch: pk.pitch,
            yaw: pk.yaw,
            head_yaw: pk.head_yaw,
            body_yaw: pk.body_yaw,
            metadata: pk.metadata.clone(),
        }
    }
}

fn float_list(values: &[f32]) -> NbtValue {
    NbtValue::List(values.iter().map(|v| NbtValue::Float(*v)).collect())
}

impl EntityRecord {
    /// Column the entity stands in.
    pub fn column(&self) -> ChunkPos {
        ChunkPos::new(
            (self.position[0].floor() as i32) >> 4,
            (self.position[2].floor() as i32) >> 4,
        )
    }

    /// Saved form of the entity.
    pub fn to_nbt(&self) -> Compound {
        let mut tag = Compound::new();
        tag.insert("identifier".into(), NbtValue::String(self.entity_type.clone()));
        tag.insert("UniqueID".into(), NbtValue::Long(self.unique_id));
        tag.insert("Pos".into(), float_list(&self.position));
        tag.insert("Rotation".into(), float_list(&[self.yaw, self.pitch]));
        tag.insert("Motion".into(), float_list(&self.velocity));
        tag.insert("Persistent".into(), NbtValue::Byte(1));

        if let Some(MetadataValue::Int(v)) = self.metadata.get(&METADATA_VARIANT) {
            tag.insert("Variant".into(), NbtValue::Int(*v));
        }
        if let Some(MetadataValue::Byte(v)) = self.metadata.get(&METADATA_COLOUR) {
            tag.insert("Color".into(), NbtValue::Byte(*v as i8));
        }
        if let Some(MetadataValue::String(name)) = self.metadata.get(&METADATA_NAME)
            && !name.is_empty()
        {
            tag.insert("CustomName".into(), NbtValue::String(name.clone()));
        }
        tag
    }
}

/// Entity types left out of saved worlds, as `*`/`?` wildcard patterns.
#[derive(Debug, Clone)]
pub struct MobFilter {
    patterns: RegexSet,
}

fn wildcard_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let mut literal = String::new();
    for c in pattern.chars() {
        if c == '*' || c == '?' {
            out.push_str(&regex::escape(&literal));
            literal.clear();
            out.push_str(if c == '*' { ".*" } else { "." });
        } else {
            literal.push(c);
        }
    }
    out.push_str(&regex::escape(&literal));
    out.push('$');
    out
}

impl MobFilter {
    pub fn new(patterns: &[String]) -> Self {
        let patterns = RegexSet::new(patterns.iter().map(|p| wildcard_regex(p)))
            .unwrap_or_else(|e| {
                warn!("Ignoring excluded mob patterns: {e}");
                RegexSet::empty()
            });
        Self { patterns }
    }

    pub fn is_excluded(&self, entity_type: &str) -> bool {
        self.patterns.is_match(entity_type)
    }
}

impl Default for MobFilter {
    fn default() -> Self {
        Self {
            patterns: RegexSet::empty(),
        }
    }
}

/// World-level data learnt from the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameData {
    /// Level name reported by the server.
    pub level_name: String,
    pub spawn: [i32; 3],
    pub seed: i64,
    pub time: i64,
    pub base_game_version: String,
    /// Latest value of every gamerule seen, by name.
    pub game_rules: BTreeMap<String, GameRule>,
}

impl GameData {
    /// Merge rule updates, newer values winning.
    pub fn update_rules(&mut self, rules: &[GameRule]) {
        for rule in rules {
            self.game_rules.insert(rule.name.clone(), rule.clone());
        }
    }
}

/// Everything captured for the world currently being recorded.
#[derive(Debug)]
pub struct WorldState {
    pub chunks: FxHashMap<ChunkPos, Chunk>,
    pub block_nbt: FxHashMap<SubChunkPos, Vec<Compound>>,
    /// Entities in view, by runtime id.
    pub entities: FxHashMap<u64, EntityRecord>,
    /// Entities the server despawned, by unique id. They are still saved.
    pub despawned: FxHashMap<i64, EntityRecord>,
    pub excluded_mobs: MobFilter,
    pub dimension: Dimension,
    pub player: PlayerPosition,
    pub game: GameData,
    /// Use the old 0..256 overworld.
    pub pre_118: bool,
    pub air_runtime_id: u32,
    /// Write the world with an empty flat generator.
    pub void_generator: bool,
    /// Folder name of the server the capture came from.
    pub server_name: String,
    world_counter: u32,
}

impl WorldState {
    pub fn new(server_name: impl Into<String>, void_generator: bool) -> Self {
        Self {
            chunks: FxHashMap::default(),
            block_nbt: FxHashMap::default(),
            entities: FxHashMap::default(),
            despawned: FxHashMap::default(),
            excluded_mobs: MobFilter::default(),
            dimension: Dimension::default(),
            player: PlayerPosition::default(),
            game: GameData::default(),
            pre_118: false,
            air_runtime_id: 0,
            void_generator,
            server_name: server_name.into(),
            world_counter: 0,
        }
    }

    /// Name of the world the current capture is saved as.
    pub fn world_name(&self) -> String {
        format!("world-{}", self.world_counter)
    }

    /// Worlds started so far in this session.
    pub fn world_counter(&self) -> u32 {
        self.world_counter
    }

    /// Whether nothing at all has been captured.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.entities.is_empty() && self.despawned.is_empty()
    }

    /// Drop captured data. Game data and the player are kept.
    pub fn reset(&mut self) {
        self.chunks.clear();
        self.block_nbt.clear();
        self.entities.clear();
        self.despawned.clear();
    }

    /// Move on to the next world name after a save.
    pub fn next_world(&mut self) {
        self.world_counter += 1;
    }

    /// Block entities grouped by column.
    pub fn block_nbt_by_column(&self) -> BTreeMap<ChunkPos, Vec<Compound>> {
        let mut out: BTreeMap<ChunkPos, Vec<Compound>> = BTreeMap::new();
        for (pos, tags) in &self.block_nbt {
            out.entry(pos.column()).or_default().extend(tags.iter().cloned());
        }
        out
    }

    /// Entities to save, grouped by the column they stand in. Excluded
    /// types are skipped.
    pub fn entities_by_column(&self) -> BTreeMap<ChunkPos, Vec<&EntityRecord>> {
        let mut out: BTreeMap<ChunkPos, Vec<&EntityRecord>> = BTreeMap::new();
        let saved = self
            .entities
            .values()
            .chain(self.despawned.values())
            .filter(|e| !self.excluded_mobs.is_excluded(&e.entity_type));
        for entity in saved {
            out.entry(entity.column()).or_default().push(entity);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(runtime_id: u64, x: f32, z: f32) -> AddActor {
        AddActor {
            unique_id: runtime_id as i64 * 10,
            runtime_id,
            entity_type: "minecraft:cow".into(),
            position: [x, 70.0, z],
            velocity: [0.0; 3],
            pitch: 0.0,
            yaw: 90.0,
            head_yaw: 90.0,
            body_yaw: 90.0,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_entity_nbt_fields() {
        let mut pk = actor(1, 1.5, -0.5);
        pk.metadata.insert(METADATA_VARIANT, MetadataValue::Int(2));
        pk.metadata.insert(METADATA_COLOUR, MetadataValue::Byte(14));
        pk.metadata.insert(METADATA_NAME, MetadataValue::String("Bessie".into()));
        let tag = EntityRecord::from(&pk).to_nbt();

        assert_eq!(tag["identifier"], NbtValue::String("minecraft:cow".into()));
        assert_eq!(tag["UniqueID"], NbtValue::Long(10));
        assert_eq!(tag["Persistent"], NbtValue::Byte(1));
        assert_eq!(tag["Variant"], NbtValue::Int(2));
        assert_eq!(tag["Color"], NbtValue::Byte(14));
        assert_eq!(tag["CustomName"], NbtValue::String("Bessie".into()));
    }

    #[test]
    fn test_entity_column_floors_negative_positions() {
        let record = EntityRecord::from(&actor(1, -0.5, 17.0));
        assert_eq!(record.column(), ChunkPos::new(-1, 1));
    }

    #[test]
    fn test_reset_keeps_game_data() {
        let mut state = WorldState::new("play.example.net", false);
        assert_eq!(state.world_name(), "world-0");
        state.entities.insert(1, EntityRecord::from(&actor(1, 0.0, 0.0)));
        assert!(!state.is_empty());
        state.game.seed = 42;

        state.reset();
        assert!(state.is_empty());
        assert_eq!(state.world_name(), "world-0");
        state.next_world();
        assert_eq!(state.world_name(), "world-1");
        assert_eq!(state.game.seed, 42);
    }

    #[test]
    fn test_grouping_by_column() {
        let mut state = WorldState::new("srv", false);
        state.entities.insert(1, EntityRecord::from(&actor(1, 1.0, 1.0)));
        state.entities.insert(2, EntityRecord::from(&actor(2, 2.0, 3.0)));
        state.entities.insert(3, EntityRecord::from(&actor(3, 20.0, 3.0)));
        let by_column = state.entities_by_column();
        assert_eq!(by_column[&ChunkPos::new(0, 0)].len(), 2);
        assert_eq!(by_column[&ChunkPos::new(1, 0)].len(), 1);

        state
            .block_nbt
            .insert(SubChunkPos::new(0, -4, 0), vec![Compound::new()]);
        state
            .block_nbt
            .insert(SubChunkPos::new(0, 5, 0), vec![Compound::new(), Compound::new()]);
        assert_eq!(state.block_nbt_by_column()[&ChunkPos::new(0, 0)].len(), 3);
    }

    #[test]
    fn test_mob_filter_wildcards() {
        let filter = MobFilter::new(&["minecraft:zombie*".into(), "minecraft:b?t".into()]);
        assert!(filter.is_excluded("minecraft:zombie"));
        assert!(filter.is_excluded("minecraft:zombie_villager"));
        assert!(filter.is_excluded("minecraft:bat"));
        assert!(!filter.is_excluded("minecraft:boat2"));
        assert!(!filter.is_excluded("minecraft:cow"));
        // regex syntax in a pattern is literal
        assert!(!MobFilter::new(&["minecraft.cow".into()]).is_excluded("minecraftXcow"));
        assert!(!MobFilter::default().is_excluded("minecraft:cow"));
    }

    #[test]
    fn test_excluded_and_despawned_entities_when_grouping() {
        let mut state = WorldState::new("srv", false);
        state.excluded_mobs = MobFilter::new(&["minecraft:zombie".into()]);
        state.entities.insert(1, EntityRecord::from(&actor(1, 1.0, 1.0)));
        let mut zombie = actor(2, 2.0, 2.0);
        zombie.entity_type = "minecraft:zombie".into();
        state.entities.insert(2, EntityRecord::from(&zombie));
        state.despawned.insert(30, EntityRecord::from(&actor(3, 40.0, 0.0)));

        let by_column = state.entities_by_column();
        assert_eq!(by_column[&ChunkPos::new(0, 0)].len(), 1);
        assert_eq!(by_column[&ChunkPos::new(2, 0)][0].runtime_id, 3);

        state.reset();
        assert!(state.despawned.is_empty());
        assert!(state.excluded_mobs.is_excluded("minecraft:zombie"));
    }
}
