//! Turns resolved terrain packets into world state.
//!
//! The assembler only ever sees packets whose blob references were already
//! filled in. It owns the [`WorldState`] for the session and decides when a
//! captured world is written out.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bedrock_config::WorldConfig;
use bedrock_net::{
    self as net, AddActor, ChunkPos, GameRulesChanged, LevelChunk, MoveActorAbsolute,
    MoveActorDelta, RemoveActor, SetActorData, SetActorMotion, StartGame, SubChunkOffset,
    SubChunkPos, SubChunkRequest, SubChunkRequestMode, SubChunkResult,
};
use tracing::{debug, info, warn};

use crate::column::Chunk;
use crate::dimension::Dimension;
use crate::nbt::{Compound, NbtValue};
use crate::notify::MapNotifier;
use crate::persist::{PersistError, flush_world};
use crate::render::{render_chunk, render_map};
use crate::state::{EntityRecord, MobFilter, PlayerPosition, WorldState};
use crate::sub_chunk::SubChunk;
use crate::wire::DecodeError;

/// Errors surfaced by the assembler.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// A column payload could not be decoded.
    #[error("failed to decode chunk: {0}")]
    Decode(#[from] DecodeError),

    /// Saving the world failed. The captured state is left untouched.
    #[error("failed to save world: {0}")]
    Persist(#[from] PersistError),
}

/// Whether a base game version such as `1.17.40` predates 1.18.
/// Unparseable versions count as current.
pub fn is_pre_118(base_game_version: &str) -> bool {
    let mut parts = base_game_version
        .split('.')
        .map(|part| part.trim().parse::<u32>());
    match (parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor))) => (major, minor) < (1, 18),
        _ => false,
    }
}

/// Slice a block entity belongs to, from its `x`/`y`/`z` tags.
fn block_entity_pos(tag: &Compound) -> Option<SubChunkPos> {
    let coord = |name: &str| tag.get(name).and_then(NbtValue::as_i64).map(|v| v as i32);
    Some(SubChunkPos::new(
        coord("x")? >> 4,
        coord("y")? >> 4,
        coord("z")? >> 4,
    ))
}

/// Builds world state from terrain, entity and game packets.
pub struct ChunkAssembler {
    state: WorldState,
    notifier: Arc<dyn MapNotifier>,
    output_dir: PathBuf,
    cull_empty_chunks: bool,
    save_entities: bool,
    save_image: bool,
}

impl ChunkAssembler {
    pub fn new(
        config: &WorldConfig,
        server_name: impl Into<String>,
        notifier: Arc<dyn MapNotifier>,
    ) -> Self {
        let mut state = WorldState::new(server_name, config.void_generator);
        state.excluded_mobs = MobFilter::new(&config.excluded_mobs);
        Self {
            state,
            notifier,
            output_dir: config.output_dir.clone(),
            cull_empty_chunks: config.cull_empty_chunks,
            save_entities: config.save_entities,
            save_image: config.save_image,
        }
    }

    /// The captured world.
    pub fn state(&self) -> &WorldState {
        &self.state
    }

    fn air(&self) -> u32 {
        self.state.air_runtime_id
    }

    fn store_block_nbt(&mut self, fallback: SubChunkPos, tags: Vec<Compound>) {
        for tag in tags {
            let pos = block_entity_pos(&tag).unwrap_or(fallback);
            self.state.block_nbt.entry(pos).or_default().push(tag);
        }
    }

    /// Take in a resolved column. Returns the slice request to send upstream
    /// when the server delivers slices on demand.
    pub fn process_chunk(
        &mut self,
        pk: &LevelChunk,
    ) -> Result<Option<SubChunkRequest>, WorldError> {
        let pos = pk.position;
        if self.state.chunks.contains_key(&pos) {
            debug!("Ignoring duplicate column {},{}", pos.x, pos.z);
            return Ok(None);
        }

        let range = self.state.dimension.range(self.state.pre_118);
        let inline = match pk.mode {
            SubChunkRequestMode::Legacy { sub_chunk_count } => sub_chunk_count as usize,
            SubChunkRequestMode::Limitless | SubChunkRequestMode::Limited { .. } => 0,
        };
        let decoded = Chunk::decode(
            &pk.raw_payload,
            inline,
            range,
            self.state.pre_118,
            self.air(),
        )?;

        self.store_block_nbt(SubChunkPos::new(pos.x, 0, pos.z), decoded.block_nbt);
        self.notifier.notify(pos, None);

        let request = match pk.mode {
            SubChunkRequestMode::Legacy { .. } => {
                self.notifier.notify(pos, Some(render_chunk(&decoded.chunk)));
                self.notifier.schedule_redraw();
                None
            }
            // never ask for slices above the dimension ceiling
            SubChunkRequestMode::Limited { highest_sub_chunk } => Some(self.sub_chunk_request(
                pk,
                range.min_sub_chunk(),
                usize::from(highest_sub_chunk).min(range.sub_chunk_count()),
            )),
            SubChunkRequestMode::Limitless => Some(self.sub_chunk_request(
                pk,
                range.min_sub_chunk(),
                range.sub_chunk_count(),
            )),
        };
        self.state.chunks.insert(pos, decoded.chunk);
        Ok(request)
    }

    fn sub_chunk_request(&self, pk: &LevelChunk, min: i32, count: usize) -> SubChunkRequest {
        let offsets = (0..count)
            .map(|i| SubChunkOffset::new(0, (min + i as i32) as i8, 0))
            .collect();
        SubChunkRequest {
            dimension: pk.dimension,
            position: SubChunkPos::new(pk.position.x, 0, pk.position.z),
            offsets,
        }
    }

    /// Apply resolved slices to their columns. Entries for unknown columns
    /// and entries that fail to decode are logged and skipped. Returns the
    /// columns that changed.
    pub fn process_sub_chunk(&mut self, pk: &net::SubChunk) -> Vec<ChunkPos> {
        let mut touched = BTreeSet::new();

        for entry in &pk.entries {
            let abs = pk.position.offset(entry.offset);
            let column = abs.column();
            let Some(chunk) = self.state.chunks.get_mut(&column) else {
                warn!(
                    "Slice {},{},{} arrived before its column, skipping",
                    abs.x, abs.y, abs.z
                );
                continue;
            };

            match entry.result {
                SubChunkResult::Success => {
                    let decoded = match SubChunk::decode_entry(&entry.raw_payload) {
                        Ok(decoded) => decoded,
                        Err(e) => {
                            warn!("Dropping slice {},{},{}: {e}", abs.x, abs.y, abs.z);
                            continue;
                        }
                    };
                    if !chunk.set_sub_chunk(abs.y, decoded.sub_chunk) {
                        warn!("Slice y={} is outside the dimension", abs.y);
                        continue;
                    }
                    self.state.block_nbt.remove(&abs);
                    self.store_block_nbt(abs, decoded.block_nbt);
                }
                SubChunkResult::SuccessAllAir => {
                    if !chunk.clear_sub_chunk(abs.y) {
                        continue;
                    }
                    self.state.block_nbt.remove(&abs);
                }
                other => {
                    debug!("Slice {},{},{} not sent: {other:?}", abs.x, abs.y, abs.z);
                    continue;
                }
            }
            touched.insert(column);
        }

        for pos in &touched {
            if let Some(chunk) = self.state.chunks.get(pos) {
                self.notifier.notify(*pos, Some(render_chunk(chunk)));
            }
        }
        if !touched.is_empty() {
            self.notifier.schedule_redraw();
        }
        touched.into_iter().collect()
    }

    /// Save what was captured so far and start a fresh world. A world is
    /// only written when it has at least one column; entities alone are
    /// dropped. Returns the archive path when something was saved. On error
    /// the state is kept.
    pub fn save_and_reset(&mut self) -> Result<Option<PathBuf>, WorldError> {
        if self.cull_empty_chunks {
            self.state.chunks.retain(|_, chunk| !chunk.is_empty());
        }
        if self.state.chunks.is_empty() {
            if !self.state.is_empty() {
                debug!("No columns captured, discarding entities");
            }
            self.state.reset();
            return Ok(None);
        }
        let dest = flush_world(&self.state, &self.output_dir)?;
        if self.save_image {
            self.save_map_image(&dest);
        }
        self.state.reset();
        self.state.next_world();
        Ok(Some(dest))
    }

    /// Write the map of the captured area as `{world}.png` beside the
    /// archive. Failures only cost the image.
    fn save_map_image(&self, archive: &Path) {
        let Some(map) = render_map(&self.state.chunks) else {
            return;
        };
        let path = archive.with_extension("png");
        match map.save(&path) {
            Ok(()) => debug!("Map image written to {}", path.display()),
            Err(e) => warn!("Failed to write map image {}: {e}", path.display()),
        }
    }

    /// The player moved to another dimension. The current world is saved
    /// first; if that fails the dimension is left unchanged.
    pub fn on_dimension_change(&mut self, dimension: i32) -> Result<Option<PathBuf>, WorldError> {
        let saved = self.save_and_reset()?;
        self.state.dimension = Dimension::from_id(dimension);
        info!("Switched to {:?}", self.state.dimension);
        Ok(saved)
    }

    /// Track the local player. The map is redrawn when the block column
    /// under the player changes.
    pub fn set_player_position(&mut self, player: PlayerPosition) {
        let moved = player.block_xz() != self.state.player.block_xz();
        self.state.player = player;
        if moved {
            self.notifier.schedule_redraw();
        }
    }

    pub fn on_start_game(&mut self, pk: &StartGame) {
        let state = &mut self.state;
        state.dimension = Dimension::from_id(pk.dimension);
        state.pre_118 = is_pre_118(&pk.base_game_version);
        state.air_runtime_id = pk.air_runtime_id;
        state.game.level_name = pk.world_name.clone();
        state.game.seed = pk.world_seed;
        state.game.spawn = pk.world_spawn;
        state.game.time = pk.time;
        state.game.base_game_version = pk.base_game_version.clone();
        state.game.update_rules(&pk.game_rules);
        state.player = PlayerPosition {
            position: pk.player_position,
            pitch: pk.pitch,
            yaw: pk.yaw,
            head_yaw: pk.yaw,
        };
        info!(
            world = %pk.world_name,
            dimension = ?state.dimension,
            pre_118 = state.pre_118,
            "Game started"
        );
    }

    pub fn on_game_rules(&mut self, pk: &GameRulesChanged) {
        self.state.game.update_rules(&pk.game_rules);
    }

    fn tracked(&mut self, runtime_id: u64) -> Option<&mut EntityRecord> {
        if !self.save_entities {
            return None;
        }
        let entity = self.state.entities.get_mut(&runtime_id);
        if entity.is_none() {
            debug!("Update for unknown entity {runtime_id}");
        }
        entity
    }

    pub fn on_add_actor(&mut self, pk: &AddActor) {
        if !self.save_entities {
            return;
        }
        self.state.despawned.remove(&pk.unique_id);
        self.state
            .entities
            .insert(pk.runtime_id, EntityRecord::from(pk));
    }

    pub fn on_set_actor_data(&mut self, pk: &SetActorData) {
        if let Some(entity) = self.tracked(pk.runtime_id) {
            entity
                .metadata
                .extend(pk.metadata.iter().map(|(k, v)| (*k, v.clone())));
        }
    }

    /// The entity left view. Its last known state is kept for the save.
    pub fn on_remove_actor(&mut self, pk: &RemoveActor) {
        let runtime_id = self
            .state
            .entities
            .iter()
            .find(|(_, e)| e.unique_id == pk.unique_id)
            .map(|(id, _)| *id);
        if let Some(entity) = runtime_id.and_then(|id| self.state.entities.remove(&id)) {
            self.state.despawned.insert(entity.unique_id, entity);
        }
    }

    pub fn on_actor_motion(&mut self, pk: &SetActorMotion) {
        if let Some(entity) = self.tracked(pk.runtime_id) {
            entity.velocity = pk.velocity;
        }
    }

    pub fn on_move_actor_delta(&mut self, pk: &MoveActorDelta) {
        let Some(entity) = self.tracked(pk.runtime_id) else {
            return;
        };
        let axes = [
            MoveActorDelta::HAS_X,
            MoveActorDelta::HAS_Y,
            MoveActorDelta::HAS_Z,
        ];
        for (i, flag) in axes.into_iter().enumerate() {
            if pk.has(flag) {
                entity.position[i] = pk.position[i];
            }
        }
        if pk.has(MoveActorDelta::HAS_ROT_X) {
            entity.pitch = pk.rotation[0];
        }
        if pk.has(MoveActorDelta::HAS_ROT_Y) {
            entity.yaw = pk.rotation[1];
        }
        if pk.has(MoveActorDelta::HAS_ROT_Z) {
            entity.head_yaw = pk.rotation[2];
        }
    }

    pub fn on_move_actor_absolute(&mut self, pk: &MoveActorAbsolute) {
        if let Some(entity) = self.tracked(pk.runtime_id) {
            entity.position = pk.position;
            entity.pitch = pk.rotation[0];
            entity.yaw = pk.rotation[1];
            entity.head_yaw = pk.rotation[2];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{PalettedStorage, STORAGE_VOLUME, block_index};
    use crate::persist::ARCHIVE_EXTENSION;
    use bedrock_net::{GameRule, GameRuleValue, MetadataValue, SubChunkEntry};
    use image::RgbaImage;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const AIR: u32 = 0;
    const STONE: u32 = 1;

    #[derive(Default)]
    struct RecordingNotifier {
        notified: Mutex<Vec<(ChunkPos, bool)>>,
        redraws: Mutex<usize>,
    }

    impl MapNotifier for RecordingNotifier {
        fn notify(&self, pos: ChunkPos, tile: Option<RgbaImage>) {
            self.notified.lock().unwrap().push((pos, tile.is_some()));
        }

        fn schedule_redraw(&self) {
            *self.redraws.lock().unwrap() += 1;
        }
    }

    fn assembler(output: &std::path::Path) -> (ChunkAssembler, Arc<RecordingNotifier>) {
        assembler_with(WorldConfig {
            output_dir: output.to_path_buf(),
            ..WorldConfig::default()
        })
    }

    fn assembler_with(config: WorldConfig) -> (ChunkAssembler, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let asm = ChunkAssembler::new(&config, "srv", notifier.clone());
        (asm, notifier)
    }

    fn sheep(runtime_id: u64, unique_id: i64) -> AddActor {
        AddActor {
            unique_id,
            runtime_id,
            entity_type: "minecraft:sheep".into(),
            position: [0.0; 3],
            velocity: [0.0; 3],
            pitch: 0.0,
            yaw: 0.0,
            head_yaw: 0.0,
            body_yaw: 0.0,
            metadata: BTreeMap::new(),
        }
    }

    fn biome_tail() -> Vec<u8> {
        let mut out = Vec::new();
        PalettedStorage::uniform(1).encode_network(&mut out);
        for _ in 1..24 {
            out.push(crate::palette::COPY_PREVIOUS);
        }
        out.push(0);
        out
    }

    fn chunk(x: i32, z: i32, mode: SubChunkRequestMode, payload: Vec<u8>) -> LevelChunk {
        LevelChunk {
            position: ChunkPos::new(x, z),
            dimension: 0,
            mode,
            cache_enabled: false,
            blob_hashes: Vec::new(),
            raw_payload: payload,
        }
    }

    fn stone_slice() -> Vec<u8> {
        let mut values = [AIR; STORAGE_VOLUME];
        values[block_index(0, 0, 0)] = STONE;
        SubChunk::from_layers(vec![PalettedStorage::from_values(&values)]).encode(0)
    }

    fn entry(dy: i8, result: SubChunkResult, payload: Vec<u8>) -> SubChunkEntry {
        SubChunkEntry {
            offset: SubChunkOffset::new(0, dy, 0),
            result,
            raw_payload: payload,
            blob_hash: None,
        }
    }

    #[test]
    fn test_pre_118_detection() {
        assert!(is_pre_118("1.17.40"));
        assert!(is_pre_118("0.16"));
        assert!(!is_pre_118("1.18.0"));
        assert!(!is_pre_118("1.20.81"));
        assert!(!is_pre_118("*"));
    }

    #[test]
    fn test_limited_column_requests_exact_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, notifier) = assembler(dir.path());
        let pk = chunk(5, -3, SubChunkRequestMode::Limited { highest_sub_chunk: 3 }, biome_tail());

        let request = asm.process_chunk(&pk).unwrap().unwrap();
        assert_eq!(request.position, SubChunkPos::new(5, 0, -3));
        assert_eq!(
            request.offsets,
            vec![
                SubChunkOffset::new(0, -4, 0),
                SubChunkOffset::new(0, -3, 0),
                SubChunkOffset::new(0, -2, 0),
            ]
        );
        assert_eq!(
            *notifier.notified.lock().unwrap(),
            vec![(ChunkPos::new(5, -3), false)]
        );

        // the same column again is ignored
        assert!(asm.process_chunk(&pk).unwrap().is_none());
        assert_eq!(notifier.notified.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_limitless_requests_full_height() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler(dir.path());
        let pk = chunk(0, 0, SubChunkRequestMode::Limitless, biome_tail());
        let request = asm.process_chunk(&pk).unwrap().unwrap();
        assert_eq!(request.offsets.len(), 24);
        assert_eq!(request.offsets[23], SubChunkOffset::new(0, 19, 0));
    }

    #[test]
    fn test_limited_count_is_capped_at_dimension_height() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler(dir.path());
        let pk = chunk(0, 0, SubChunkRequestMode::Limited { highest_sub_chunk: 300 }, biome_tail());

        let request = asm.process_chunk(&pk).unwrap().unwrap();
        assert_eq!(request.offsets.len(), 24);
        assert!(request.offsets.iter().all(|o| (-4..20).contains(&o.dy)));
        assert_eq!(request.offsets.last(), Some(&SubChunkOffset::new(0, 19, 0)));
    }

    #[test]
    fn test_legacy_column_is_rendered() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, notifier) = assembler(dir.path());
        let mut payload = stone_slice();
        payload.extend(biome_tail());
        let pk = chunk(1, 1, SubChunkRequestMode::Legacy { sub_chunk_count: 1 }, payload);

        assert!(asm.process_chunk(&pk).unwrap().is_none());
        assert_eq!(
            *notifier.notified.lock().unwrap(),
            vec![(ChunkPos::new(1, 1), false), (ChunkPos::new(1, 1), true)]
        );
        let stored = &asm.state().chunks[&ChunkPos::new(1, 1)];
        assert_eq!(stored.highest_block(0, 0), Some((0, STONE)));
    }

    #[test]
    fn test_bad_column_payload_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler(dir.path());
        let pk = chunk(0, 0, SubChunkRequestMode::Legacy { sub_chunk_count: 1 }, vec![42]);
        assert!(matches!(asm.process_chunk(&pk), Err(WorldError::Decode(_))));
        assert!(asm.state().chunks.is_empty());
    }

    #[test]
    fn test_sub_chunks_apply_to_known_columns_only() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, notifier) = assembler(dir.path());
        asm.process_chunk(&chunk(0, 0, SubChunkRequestMode::Limitless, biome_tail()))
            .unwrap();

        let pk = net::SubChunk {
            cache_enabled: false,
            dimension: 0,
            position: SubChunkPos::new(0, 0, 0),
            entries: vec![
                entry(0, SubChunkResult::Success, stone_slice()),
                entry(1, SubChunkResult::SuccessAllAir, Vec::new()),
                entry(2, SubChunkResult::ChunkNotFound, Vec::new()),
                SubChunkEntry {
                    offset: SubChunkOffset::new(1, 0, 0),
                    ..entry(0, SubChunkResult::Success, stone_slice())
                },
            ],
        };
        let touched = asm.process_sub_chunk(&pk);

        assert_eq!(touched, vec![ChunkPos::new(0, 0)]);
        assert!(!asm.state().chunks.contains_key(&ChunkPos::new(1, 0)));
        let column = &asm.state().chunks[&ChunkPos::new(0, 0)];
        assert_eq!(column.highest_block(0, 0), Some((0, STONE)));
        assert_eq!(*notifier.redraws.lock().unwrap(), 1);
        assert_eq!(
            notifier.notified.lock().unwrap().last(),
            Some(&(ChunkPos::new(0, 0), true))
        );
    }

    #[test]
    fn test_unknown_column_sub_chunk_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, notifier) = assembler(dir.path());
        let pk = net::SubChunk {
            cache_enabled: false,
            dimension: 0,
            position: SubChunkPos::new(9, 0, 9),
            entries: vec![entry(0, SubChunkResult::Success, stone_slice())],
        };
        assert!(asm.process_sub_chunk(&pk).is_empty());
        assert!(asm.state().chunks.is_empty());
        assert!(notifier.notified.lock().unwrap().is_empty());
        assert_eq!(*notifier.redraws.lock().unwrap(), 0);
    }

    #[test]
    fn test_dimension_change_saves_then_resets() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler(dir.path());
        asm.process_chunk(&chunk(0, 0, SubChunkRequestMode::Limitless, biome_tail()))
            .unwrap();

        let saved = asm.on_dimension_change(1).unwrap().unwrap();
        assert_eq!(saved.extension().unwrap(), ARCHIVE_EXTENSION);
        assert!(saved.is_file());
        assert!(asm.state().chunks.is_empty());
        assert_eq!(asm.state().dimension, Dimension::Nether);
        assert_eq!(asm.state().world_name(), "world-1");

        // nothing captured: no archive, same world name
        assert!(asm.on_dimension_change(0).unwrap().is_none());
        assert_eq!(asm.state().world_name(), "world-1");
    }

    #[test]
    fn test_entities_without_columns_are_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler(dir.path());
        asm.on_add_actor(&sheep(2, 1));

        assert!(asm.save_and_reset().unwrap().is_none());
        assert!(asm.state().is_empty());
        assert_eq!(asm.state().world_name(), "world-0");
        assert!(!dir.path().join("srv").exists());
    }

    #[test]
    fn test_map_image_is_written_beside_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler_with(WorldConfig {
            output_dir: dir.path().to_path_buf(),
            save_image: true,
            ..WorldConfig::default()
        });
        let mut payload = stone_slice();
        payload.extend(biome_tail());
        asm.process_chunk(&chunk(0, 0, SubChunkRequestMode::Legacy { sub_chunk_count: 1 }, payload))
            .unwrap();

        let saved = asm.save_and_reset().unwrap().unwrap();
        let png = saved.with_extension("png");
        let map = image::open(&png).unwrap().to_rgba8();
        assert_eq!(map.dimensions(), (16, 16));
        assert_eq!(map.get_pixel(0, 0).0[3], 255);
    }

    #[test]
    fn test_no_map_image_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler(dir.path());
        asm.process_chunk(&chunk(0, 0, SubChunkRequestMode::Limitless, biome_tail()))
            .unwrap();
        let saved = asm.save_and_reset().unwrap().unwrap();
        assert!(!saved.with_extension("png").exists());
    }

    #[test]
    fn test_failed_save_keeps_state_and_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("out");
        std::fs::write(&blocker, b"file").unwrap();
        let (mut asm, _) = assembler(&blocker);
        asm.process_chunk(&chunk(0, 0, SubChunkRequestMode::Limitless, biome_tail()))
            .unwrap();

        assert!(asm.on_dimension_change(2).is_err());
        assert_eq!(asm.state().chunks.len(), 1);
        assert_eq!(asm.state().dimension, Dimension::Overworld);
    }

    #[test]
    fn test_player_movement_redraws_on_new_block() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, notifier) = assembler(dir.path());
        let mut player = PlayerPosition {
            position: [0.2, 64.0, 0.2],
            ..PlayerPosition::default()
        };
        asm.set_player_position(player);
        player.position = [0.9, 65.0, 0.9];
        asm.set_player_position(player);
        assert_eq!(*notifier.redraws.lock().unwrap(), 0);
        player.position = [1.1, 65.0, 0.9];
        asm.set_player_position(player);
        assert_eq!(*notifier.redraws.lock().unwrap(), 1);
    }

    #[test]
    fn test_start_game_and_entities() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler(dir.path());
        asm.on_start_game(&StartGame {
            world_name: "Lobby".into(),
            dimension: 0,
            player_position: [0.0, 70.0, 0.0],
            pitch: 0.0,
            yaw: 0.0,
            world_spawn: [0, 70, 0],
            world_seed: 99,
            base_game_version: "1.16.0".into(),
            game_rules: vec![GameRule {
                name: "pvp".into(),
                value: GameRuleValue::Bool(false),
            }],
            air_runtime_id: 134,
            time: 0,
        });
        assert!(asm.state().pre_118);
        assert_eq!(asm.state().air_runtime_id, 134);
        assert_eq!(asm.state().game.seed, 99);

        asm.on_game_rules(&GameRulesChanged {
            game_rules: vec![GameRule {
                name: "pvp".into(),
                value: GameRuleValue::Bool(true),
            }],
        });
        assert_eq!(
            asm.state().game.game_rules["pvp"].value,
            GameRuleValue::Bool(true)
        );

        asm.on_add_actor(&AddActor {
            unique_id: 1,
            runtime_id: 2,
            entity_type: "minecraft:sheep".into(),
            position: [0.0; 3],
            velocity: [0.0; 3],
            pitch: 0.0,
            yaw: 0.0,
            head_yaw: 0.0,
            body_yaw: 0.0,
            metadata: BTreeMap::new(),
        });
        asm.on_set_actor_data(&SetActorData {
            runtime_id: 2,
            metadata: BTreeMap::from([(3, MetadataValue::Byte(14))]),
        });
        asm.on_set_actor_data(&SetActorData {
            runtime_id: 99,
            metadata: BTreeMap::new(),
        });
        assert_eq!(
            asm.state().entities[&2].metadata[&3],
            MetadataValue::Byte(14)
        );
        assert_eq!(asm.state().entities.len(), 1);
    }

    #[test]
    fn test_entity_movement_is_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler(dir.path());
        asm.on_add_actor(&sheep(2, 20));

        asm.on_move_actor_absolute(&MoveActorAbsolute {
            runtime_id: 2,
            position: [10.0, 64.0, -5.0],
            rotation: [1.0, 2.0, 3.0],
        });
        asm.on_move_actor_delta(&MoveActorDelta {
            runtime_id: 2,
            flags: MoveActorDelta::HAS_Y | MoveActorDelta::HAS_ROT_Y,
            position: [99.0, 70.0, 99.0],
            rotation: [50.0, 60.0, 70.0],
        });
        asm.on_actor_motion(&SetActorMotion {
            runtime_id: 2,
            velocity: [0.1, 0.0, -0.1],
        });

        let sheep = &asm.state().entities[&2];
        assert_eq!(sheep.position, [10.0, 70.0, -5.0]);
        assert_eq!((sheep.pitch, sheep.yaw, sheep.head_yaw), (1.0, 60.0, 3.0));
        assert_eq!(sheep.velocity, [0.1, 0.0, -0.1]);
    }

    #[test]
    fn test_removed_entity_is_kept_until_respawn() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler(dir.path());
        asm.on_add_actor(&sheep(2, 20));
        asm.on_remove_actor(&RemoveActor { unique_id: 20 });
        asm.on_remove_actor(&RemoveActor { unique_id: 404 });

        assert!(asm.state().entities.is_empty());
        assert_eq!(asm.state().despawned[&20].runtime_id, 2);
        // moves for a despawned runtime id are ignored
        asm.on_actor_motion(&SetActorMotion {
            runtime_id: 2,
            velocity: [1.0; 3],
        });
        assert_eq!(asm.state().despawned[&20].velocity, [0.0; 3]);

        asm.on_add_actor(&sheep(7, 20));
        assert!(asm.state().despawned.is_empty());
        assert!(asm.state().entities.contains_key(&7));
    }

    #[test]
    fn test_entities_ignored_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler_with(WorldConfig {
            output_dir: dir.path().to_path_buf(),
            save_entities: false,
            ..WorldConfig::default()
        });
        asm.on_add_actor(&sheep(2, 20));
        asm.on_set_actor_data(&SetActorData {
            runtime_id: 2,
            metadata: BTreeMap::new(),
        });
        assert!(asm.state().entities.is_empty());
    }

    #[test]
    fn test_excluded_mobs_come_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let (mut asm, _) = assembler_with(WorldConfig {
            output_dir: dir.path().to_path_buf(),
            excluded_mobs: vec!["minecraft:sh*".into()],
            ..WorldConfig::default()
        });
        asm.on_add_actor(&sheep(2, 20));
        // still tracked, only left out when saving
        assert_eq!(asm.state().entities.len(), 1);
        assert!(asm.state().entities_by_column().is_empty());
    }
}
