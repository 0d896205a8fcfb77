//! Packet plumbing for the relay: frame codec, packet catalogue, and framed
//! connections whose write side tolerates concurrent writers.

pub mod conn;
pub mod framing;
pub mod protocol;

pub use conn::{
    ConnError, FramedReader, FramedWriter, PacketSink, PacketSource, TcpPacketReader,
    TcpPacketWriter, connect, split_tcp,
};
pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use protocol::{
    AddActor, BlobHash, CacheBlob, ChangeDimension, ChunkPos, ClientCacheBlobStatus,
    ClientCacheMissResponse, ClientCacheStatus, DEFAULT_CODEC_VERSION, Disconnect, GameRule,
    GameRuleValue, GameRulesChanged, LevelChunk, MetadataValue, MoveActorAbsolute, MoveActorDelta,
    MovePlayer, Packet, PacketCodec, PacketError, RawPacket, RemoveActor, SetActorData,
    SetActorMotion, StartGame, SubChunk, SubChunkEntry, SubChunkOffset, SubChunkPos,
    SubChunkRequest, SubChunkRequestMode, SubChunkResult,
};
