//! Packet catalogue and codec.
//!
//! Only the packets the relay inspects are modelled structurally; everything
//! else travels as an opaque [`RawPacket`]. Packets are serialized with
//! [`postcard`] and prefixed with a codec version byte chosen when the
//! [`PacketCodec`] is constructed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Codec version used when none is configured.
pub const DEFAULT_CODEC_VERSION: u8 = 1;

/// 64-bit content id of a cached chunk fragment.
pub type BlobHash = u64;

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// Column position in chunk coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    /// Chunk X.
    pub x: i32,
    /// Chunk Z.
    pub z: i32,
}

impl ChunkPos {
    /// Creates a new column position.
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Position of a 16×16×16 slice in sub-chunk coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubChunkPos {
    /// Chunk X.
    pub x: i32,
    /// Sub-chunk Y (block Y divided by 16).
    pub y: i32,
    /// Chunk Z.
    pub z: i32,
}

impl SubChunkPos {
    /// Creates a new sub-chunk position.
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Column this slice belongs to.
    pub fn column(self) -> ChunkPos {
        ChunkPos::new(self.x, self.z)
    }

    /// Absolute position of the slice at `offset` from this base. Positions
    /// come off the wire, so the arithmetic wraps instead of overflowing.
    pub fn offset(self, offset: SubChunkOffset) -> Self {
        Self {
            x: self.x.wrapping_add(i32::from(offset.dx)),
            y: self.y.wrapping_add(i32::from(offset.dy)),
            z: self.z.wrapping_add(i32::from(offset.dz)),
        }
    }
}

/// Slice offset relative to a [`SubChunkPos`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubChunkOffset {
    /// X offset in chunks.
    pub dx: i8,
    /// Y offset in sub-chunks.
    pub dy: i8,
    /// Z offset in chunks.
    pub dz: i8,
}

impl SubChunkOffset {
    /// Creates a new offset.
    pub fn new(dx: i8, dy: i8, dz: i8) -> Self {
        Self { dx, dy, dz }
    }
}

// ---------------------------------------------------------------------------
// Top-level enum
// ---------------------------------------------------------------------------

/// A relayed packet. The enum discriminant is the type tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Packet {
    // --- Terrain ---
    /// Server sends a chunk column.
    LevelChunk(LevelChunk),
    /// Server sends one or more vertical slices.
    SubChunk(SubChunk),
    /// Client asks the server for vertical slices.
    SubChunkRequest(SubChunkRequest),

    // --- Blob cache ---
    /// Client declares whether it supports the blob cache.
    ClientCacheStatus(ClientCacheStatus),
    /// Client lists blobs it already has and blobs it is missing.
    ClientCacheBlobStatus(ClientCacheBlobStatus),
    /// Server delivers blobs the client reported missing.
    ClientCacheMissResponse(ClientCacheMissResponse),

    // --- World ---
    /// Server sends world settings at join.
    StartGame(StartGame),
    /// Server moves the player to another dimension.
    ChangeDimension(ChangeDimension),
    /// Server updates gamerules.
    GameRulesChanged(GameRulesChanged),
    /// Player position update, sent by either side.
    MovePlayer(MovePlayer),
    /// Server spawns an entity.
    AddActor(AddActor),
    /// Server updates entity metadata.
    SetActorData(SetActorData),
    /// Server despawns an entity.
    RemoveActor(RemoveActor),
    /// Server sets an entity's velocity.
    SetActorMotion(SetActorMotion),
    /// Server moves an entity by the fields named in its flags.
    MoveActorDelta(MoveActorDelta),
    /// Server moves an entity to an absolute position.
    MoveActorAbsolute(MoveActorAbsolute),

    // --- System ---
    /// Connection is being closed with a reason.
    Disconnect(Disconnect),
    /// Any packet the relay does not inspect.
    Raw(RawPacket),
}

impl Packet {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Packet::LevelChunk(_) => "LevelChunk",
            Packet::SubChunk(_) => "SubChunk",
            Packet::SubChunkRequest(_) => "SubChunkRequest",
            Packet::ClientCacheStatus(_) => "ClientCacheStatus",
            Packet::ClientCacheBlobStatus(_) => "ClientCacheBlobStatus",
            Packet::ClientCacheMissResponse(_) => "ClientCacheMissResponse",
            Packet::StartGame(_) => "StartGame",
            Packet::ChangeDimension(_) => "ChangeDimension",
            Packet::GameRulesChanged(_) => "GameRulesChanged",
            Packet::MovePlayer(_) => "MovePlayer",
            Packet::AddActor(_) => "AddActor",
            Packet::SetActorData(_) => "SetActorData",
            Packet::RemoveActor(_) => "RemoveActor",
            Packet::SetActorMotion(_) => "SetActorMotion",
            Packet::MoveActorDelta(_) => "MoveActorDelta",
            Packet::MoveActorAbsolute(_) => "MoveActorAbsolute",
            Packet::Disconnect(_) => "Disconnect",
            Packet::Raw(_) => "Raw",
        }
    }
}

// ---------------------------------------------------------------------------
// Terrain payloads
// ---------------------------------------------------------------------------

/// How the server delivers the vertical slices of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubChunkRequestMode {
    /// Slices are inlined in the column payload.
    Legacy {
        /// Number of slices in the payload.
        sub_chunk_count: u32,
    },
    /// Client requests every slice of the dimension's height.
    Limitless,
    /// Client requests slices up to a server-reported height.
    Limited {
        /// Number of slices counted from the bottom of the dimension.
        highest_sub_chunk: u16,
    },
}

/// Chunk column sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelChunk {
    /// Column position.
    pub position: ChunkPos,
    /// Dimension id.
    pub dimension: i32,
    /// Slice delivery mode.
    pub mode: SubChunkRequestMode,
    /// Whether `blob_hashes` references cached payload fragments.
    pub cache_enabled: bool,
    /// Fragments that precede `raw_payload`, in order.
    pub blob_hashes: Vec<BlobHash>,
    /// Inline payload.
    pub raw_payload: Vec<u8>,
}

/// Outcome of a single slice lookup on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubChunkResult {
    /// Payload present.
    Success,
    /// Column not loaded on the server.
    ChunkNotFound,
    /// Unknown dimension.
    InvalidDimension,
    /// Requesting player unknown.
    PlayerNotFound,
    /// Slice outside the dimension's height.
    IndexOutOfBounds,
    /// Slice exists and is entirely air; no payload.
    SuccessAllAir,
}

/// One slice of a [`SubChunk`] packet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubChunkEntry {
    /// Offset from the packet's base position.
    pub offset: SubChunkOffset,
    /// Lookup result.
    pub result: SubChunkResult,
    /// Slice payload, empty while `blob_hash` is set.
    pub raw_payload: Vec<u8>,
    /// Cached fragment holding the payload.
    pub blob_hash: Option<BlobHash>,
}

/// Slices sent by the server in response to a [`SubChunkRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubChunk {
    /// Whether entries reference cached fragments.
    pub cache_enabled: bool,
    /// Dimension id.
    pub dimension: i32,
    /// Base position the entry offsets are relative to.
    pub position: SubChunkPos,
    /// Slices.
    pub entries: Vec<SubChunkEntry>,
}

/// Request for slices of a column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubChunkRequest {
    /// Dimension id.
    pub dimension: i32,
    /// Base position.
    pub position: SubChunkPos,
    /// Requested offsets.
    pub offsets: Vec<SubChunkOffset>,
}

// ---------------------------------------------------------------------------
// Blob cache payloads
// ---------------------------------------------------------------------------

/// Client announces blob cache support.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientCacheStatus {
    /// Whether the client keeps its own blob cache.
    pub enabled: bool,
}

/// Hashes the sender has and lacks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientCacheBlobStatus {
    /// Hashes the sender needs delivered.
    pub miss_hashes: Vec<BlobHash>,
    /// Hashes the sender already holds.
    pub hit_hashes: Vec<BlobHash>,
}

impl ClientCacheBlobStatus {
    /// Whether the status lists no hashes at all.
    pub fn is_empty(&self) -> bool {
        self.miss_hashes.is_empty() && self.hit_hashes.is_empty()
    }
}

/// A cached fragment and its content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheBlob {
    /// Content id.
    pub hash: BlobHash,
    /// Content.
    pub payload: Vec<u8>,
}

/// Fragments delivered in answer to a [`ClientCacheBlobStatus`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClientCacheMissResponse {
    /// Delivered fragments.
    pub blobs: Vec<CacheBlob>,
}

// ---------------------------------------------------------------------------
// World payloads
// ---------------------------------------------------------------------------

/// Value of a gamerule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum GameRuleValue {
    /// Boolean rule.
    Bool(bool),
    /// Integer rule.
    Int(u32),
    /// Float rule.
    Float(f32),
}

/// A named gamerule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRule {
    /// Rule name as sent by the server, e.g. `dodaylightcycle`.
    pub name: String,
    /// Rule value.
    pub value: GameRuleValue,
}

/// World settings sent once at join.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartGame {
    /// Level name shown to the player.
    pub world_name: String,
    /// Dimension the player spawns in.
    pub dimension: i32,
    /// Player position.
    pub player_position: [f32; 3],
    /// Player pitch.
    pub pitch: f32,
    /// Player yaw.
    pub yaw: f32,
    /// World spawn block position.
    pub world_spawn: [i32; 3],
    /// World seed.
    pub world_seed: i64,
    /// Base game version, e.g. `1.20.40`.
    pub base_game_version: String,
    /// Gamerules in effect.
    pub game_rules: Vec<GameRule>,
    /// Runtime id of `minecraft:air` in the session's block palette.
    pub air_runtime_id: u32,
    /// World time in ticks.
    pub time: i64,
}

/// Dimension change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeDimension {
    /// Target dimension id.
    pub dimension: i32,
    /// Position in the target dimension.
    pub position: [f32; 3],
    /// Whether the change is a respawn.
    pub respawn: bool,
}

/// Gamerule update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRulesChanged {
    /// Updated rules.
    pub game_rules: Vec<GameRule>,
}

/// Player movement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovePlayer {
    /// Runtime id of the moving player.
    pub runtime_id: u64,
    /// Position.
    pub position: [f32; 3],
    /// Pitch.
    pub pitch: f32,
    /// Yaw.
    pub yaw: f32,
    /// Head yaw.
    pub head_yaw: f32,
}

/// Entity metadata value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum MetadataValue {
    /// 8-bit value.
    Byte(u8),
    /// 16-bit value.
    Short(i16),
    /// 32-bit value.
    Int(i32),
    /// Float value.
    Float(f32),
    /// String value.
    String(String),
    /// 64-bit value.
    Long(i64),
    /// Vector value.
    Vec3([f32; 3]),
}

/// Entity spawn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AddActor {
    /// Unique id, stable across the world.
    pub unique_id: i64,
    /// Runtime id, stable for the session.
    pub runtime_id: u64,
    /// Entity identifier, e.g. `minecraft:cow`.
    pub entity_type: String,
    /// Position.
    pub position: [f32; 3],
    /// Velocity.
    pub velocity: [f32; 3],
    /// Pitch.
    pub pitch: f32,
    /// Yaw.
    pub yaw: f32,
    /// Head yaw.
    pub head_yaw: f32,
    /// Body yaw.
    pub body_yaw: f32,
    /// Metadata keyed by metadata id.
    pub metadata: BTreeMap<u32, MetadataValue>,
}

/// Entity metadata update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetActorData {
    /// Runtime id of the entity.
    pub runtime_id: u64,
    /// Changed metadata entries.
    pub metadata: BTreeMap<u32, MetadataValue>,
}

/// Entity despawn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoveActor {
    /// Unique id of the entity.
    pub unique_id: i64,
}

/// Entity velocity update.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetActorMotion {
    /// Runtime id of the entity.
    pub runtime_id: u64,
    /// New velocity.
    pub velocity: [f32; 3],
}

/// Partial entity movement. Only the fields whose flag is set are valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveActorDelta {
    /// Runtime id of the entity.
    pub runtime_id: u64,
    /// `HAS_*` bits.
    pub flags: u16,
    /// Position.
    pub position: [f32; 3],
    /// Pitch, yaw and head yaw.
    pub rotation: [f32; 3],
}

impl MoveActorDelta {
    pub const HAS_X: u16 = 1 << 0;
    pub const HAS_Y: u16 = 1 << 1;
    pub const HAS_Z: u16 = 1 << 2;
    pub const HAS_ROT_X: u16 = 1 << 3;
    pub const HAS_ROT_Y: u16 = 1 << 4;
    pub const HAS_ROT_Z: u16 = 1 << 5;

    /// Whether `flag` is set.
    pub fn has(&self, flag: u16) -> bool {
        self.flags & flag != 0
    }
}

/// Absolute entity movement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoveActorAbsolute {
    /// Runtime id of the entity.
    pub runtime_id: u64,
    /// Position.
    pub position: [f32; 3],
    /// Pitch, yaw and head yaw.
    pub rotation: [f32; 3],
}

/// Disconnect notice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Disconnect {
    /// Reason shown to the player.
    pub message: String,
}

/// Packet forwarded without inspection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawPacket {
    /// Bedrock packet id.
    pub id: u32,
    /// Encoded body.
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while encoding or decoding packets.
#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match the codec's version.
    #[error("unsupported codec version {got}, expected {expected}")]
    UnsupportedVersion {
        /// Version found on the wire.
        got: u8,
        /// Version the codec was built for.
        expected: u8,
    },

    /// Postcard (de)serialization failed.
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Encodes and decodes [`Packet`]s.
///
/// Wire format: `[version: u8] [postcard-encoded Packet]`. The version is a
/// constructor parameter so replayed captures recorded with another codec
/// version can be read without patching codec state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketCodec {
    version: u8,
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(DEFAULT_CODEC_VERSION)
    }
}

impl PacketCodec {
    /// Creates a codec for the given version byte.
    pub fn new(version: u8) -> Self {
        Self { version }
    }

    /// Version byte written and expected by this codec.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Serialize a packet into a versioned payload.
    pub fn encode(&self, packet: &Packet) -> Result<Vec<u8>, PacketError> {
        let body = postcard::to_allocvec(packet)?;
        let mut out = Vec::with_capacity(1 + body.len());
        out.push(self.version);
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Deserialize a versioned payload into a packet.
    pub fn decode(&self, data: &[u8]) -> Result<Packet, PacketError> {
        let Some((&version, body)) = data.split_first() else {
            return Err(PacketError::EmptyPayload);
        };
        if version != self.version {
            return Err(PacketError::UnsupportedVersion {
                got: version,
                expected: self.version,
            });
        }
        Ok(postcard::from_bytes(body)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk() -> LevelChunk {
        LevelChunk {
            position: ChunkPos::new(-3, 7),
            dimension: 0,
            mode: SubChunkRequestMode::Limited {
                highest_sub_chunk: 5,
            },
            cache_enabled: true,
            blob_hashes: vec![111, 222],
            raw_payload: vec![0, 1, 2],
        }
    }

    #[test]
    fn test_level_chunk_roundtrip() {
        let codec = PacketCodec::default();
        let packet = Packet::LevelChunk(sample_chunk());
        let bytes = codec.encode(&packet).unwrap();
        assert_eq!(bytes[0], DEFAULT_CODEC_VERSION);
        assert_eq!(codec.decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_actor_metadata_survives_roundtrip() {
        let codec = PacketCodec::default();
        let mut metadata = BTreeMap::new();
        metadata.insert(2, MetadataValue::Int(7));
        metadata.insert(4, MetadataValue::String("Steve".into()));
        let packet = Packet::AddActor(AddActor {
            unique_id: -9,
            runtime_id: 9,
            entity_type: "minecraft:cow".into(),
            position: [1.0, 64.0, -1.5],
            velocity: [0.0; 3],
            pitch: 0.0,
            yaw: 90.0,
            head_yaw: 90.0,
            body_yaw: 90.0,
            metadata,
        });
        let bytes = codec.encode(&packet).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), packet);
    }

    #[test]
    fn test_codec_version_is_configurable() {
        let old = PacketCodec::new(3);
        let packet = Packet::Disconnect(Disconnect {
            message: "bye".into(),
        });
        let bytes = old.encode(&packet).unwrap();
        assert_eq!(bytes[0], 3);
        assert_eq!(old.decode(&bytes).unwrap(), packet);

        let result = PacketCodec::default().decode(&bytes);
        assert!(matches!(
            result,
            Err(PacketError::UnsupportedVersion {
                got: 3,
                expected: DEFAULT_CODEC_VERSION
            })
        ));
    }

    #[test]
    fn test_empty_payload_rejected() {
        let result = PacketCodec::default().decode(&[]);
        assert!(matches!(result, Err(PacketError::EmptyPayload)));
    }

    #[test]
    fn test_corrupted_payload_rejected() {
        let result = PacketCodec::default().decode(&[DEFAULT_CODEC_VERSION, 0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sub_chunk_offset_arithmetic() {
        let base = SubChunkPos::new(4, -4, 9);
        let abs = base.offset(SubChunkOffset::new(-1, 3, 1));
        assert_eq!(abs, SubChunkPos::new(3, -1, 10));
        assert_eq!(abs.column(), ChunkPos::new(3, 10));
    }

    #[test]
    fn test_sub_chunk_offset_wraps_at_the_edge() {
        let base = SubChunkPos::new(i32::MAX, i32::MIN, 0);
        let abs = base.offset(SubChunkOffset::new(1, -1, 0));
        assert_eq!(abs, SubChunkPos::new(i32::MIN, i32::MAX, 0));
    }

    #[test]
    fn test_move_delta_flags() {
        let delta = MoveActorDelta {
            runtime_id: 3,
            flags: MoveActorDelta::HAS_X | MoveActorDelta::HAS_ROT_Y,
            position: [1.0, 2.0, 3.0],
            rotation: [10.0, 20.0, 30.0],
        };
        assert!(delta.has(MoveActorDelta::HAS_X));
        assert!(!delta.has(MoveActorDelta::HAS_Y));
        assert_eq!(Packet::MoveActorDelta(delta).name(), "MoveActorDelta");
    }

    #[test]
    fn test_packet_names() {
        assert_eq!(Packet::LevelChunk(sample_chunk()).name(), "LevelChunk");
        let raw = Packet::Raw(RawPacket {
            id: 0x09,
            payload: vec![],
        });
        assert_eq!(raw.name(), "Raw");
    }

    #[test]
    fn test_blob_status_emptiness() {
        assert!(ClientCacheBlobStatus::default().is_empty());
        let status = ClientCacheBlobStatus {
            miss_hashes: vec![],
            hit_hashes: vec![1],
        };
        assert!(!status.is_empty());
    }
}
