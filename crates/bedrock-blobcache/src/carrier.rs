//! Packets that reference cached blobs.
//!
//! The engine only ever needs three things from such a packet: the hashes it
//! references, the columns it belongs to, and a way to splice the blob bodies
//! back in. [`BlobCarrier`] is that capability; [`Skeleton`] is the closed set
//! of packet kinds that have it.

use std::collections::BTreeSet;

use bedrock_net::{BlobHash, ChunkPos, LevelChunk, Packet, SubChunk, SubChunkResult};
use tracing::error;

use crate::error::BlobCacheError;
use crate::store::BlobStore;

/// A packet whose payload may live partly in the blob cache.
pub trait BlobCarrier {
    /// Referenced hashes in declaration order. Duplicates are kept.
    fn blob_hashes(&self) -> Vec<BlobHash>;

    /// Distinct columns whose data the packet carries.
    fn columns(&self) -> BTreeSet<ChunkPos>;

    /// Replace every hash reference with the stored payload and clear the
    /// cache flag. Hashes missing from the store are logged and skipped.
    fn fill(&mut self, store: &BlobStore) -> Result<(), BlobCacheError>;
}

impl BlobCarrier for LevelChunk {
    fn blob_hashes(&self) -> Vec<BlobHash> {
        self.blob_hashes.clone()
    }

    fn columns(&self) -> BTreeSet<ChunkPos> {
        BTreeSet::from([self.position])
    }

    fn fill(&mut self, store: &BlobStore) -> Result<(), BlobCacheError> {
        let mut payload = Vec::new();
        for &hash in &self.blob_hashes {
            match store.get(hash)? {
                Some(blob) => payload.extend_from_slice(&blob),
                None => error!("Blob {hash:#018x} vanished before fill"),
            }
        }
        payload.append(&mut self.raw_payload);
        self.raw_payload = payload;
        self.cache_enabled = false;
        self.blob_hashes.clear();
        Ok(())
    }
}

impl BlobCarrier for SubChunk {
    fn blob_hashes(&self) -> Vec<BlobHash> {
        self.entries
            .iter()
            .filter(|entry| entry.result == SubChunkResult::Success)
            .filter_map(|entry| entry.blob_hash)
            .collect()
    }

    fn columns(&self) -> BTreeSet<ChunkPos> {
        self.entries
            .iter()
            .filter(|entry| entry.result == SubChunkResult::Success)
            .map(|entry| self.position.offset(entry.offset).column())
            .collect()
    }

    fn fill(&mut self, store: &BlobStore) -> Result<(), BlobCacheError> {
        for entry in &mut self.entries {
            let Some(hash) = entry.blob_hash.take() else {
                continue;
            };
            if entry.result != SubChunkResult::Success {
                continue;
            }
            match store.get(hash)? {
                Some(blob) => entry.raw_payload = blob,
                None => error!("Blob {hash:#018x} vanished before fill"),
            }
        }
        self.cache_enabled = false;
        Ok(())
    }
}

/// A blob-referencing packet held while its blobs are outstanding.
#[derive(Debug, Clone)]
pub enum Skeleton {
    /// Column packet.
    Chunk(LevelChunk),
    /// Slice packet.
    SubChunk(SubChunk),
}

impl Skeleton {
    /// The carrier capability of the held packet.
    pub fn carrier(&self) -> &dyn BlobCarrier {
        match self {
            Skeleton::Chunk(pk) => pk as &dyn BlobCarrier,
            Skeleton::SubChunk(pk) => pk as &dyn BlobCarrier,
        }
    }

    /// Fill from the store and turn back into a relayable packet.
    pub fn into_filled(self, store: &BlobStore) -> Result<Packet, BlobCacheError> {
        Ok(match self {
            Skeleton::Chunk(mut pk) => {
                pk.fill(store)?;
                Packet::LevelChunk(pk)
            }
            Skeleton::SubChunk(mut pk) => {
                pk.fill(store)?;
                Packet::SubChunk(pk)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bedrock_net::{SubChunkEntry, SubChunkOffset, SubChunkPos, SubChunkRequestMode};

    fn entry(dx: i8, dy: i8, result: SubChunkResult, hash: Option<BlobHash>) -> SubChunkEntry {
        SubChunkEntry {
            offset: SubChunkOffset::new(dx, dy, 0),
            result,
            raw_payload: Vec::new(),
            blob_hash: hash,
        }
    }

    #[test]
    fn test_chunk_fill_orders_blobs_before_inline_payload() {
        let store = BlobStore::in_memory().unwrap();
        store.put(1, b"AA").unwrap();
        store.put(2, b"BB").unwrap();
        let mut chunk = LevelChunk {
            position: ChunkPos::new(0, 0),
            dimension: 0,
            mode: SubChunkRequestMode::Legacy { sub_chunk_count: 2 },
            cache_enabled: true,
            blob_hashes: vec![2, 1],
            raw_payload: b"tail".to_vec(),
        };
        chunk.fill(&store).unwrap();
        assert_eq!(chunk.raw_payload, b"BBAAtail");
        assert!(!chunk.cache_enabled);
        assert!(chunk.blob_hashes.is_empty());
    }

    #[test]
    fn test_sub_chunk_skips_failed_entries() {
        let pk = SubChunk {
            cache_enabled: true,
            dimension: 0,
            position: SubChunkPos::new(1, 0, 1),
            entries: vec![
                entry(0, 0, SubChunkResult::Success, Some(10)),
                entry(0, 1, SubChunkResult::ChunkNotFound, Some(11)),
                entry(1, 2, SubChunkResult::SuccessAllAir, None),
            ],
        };
        assert_eq!(pk.blob_hashes(), vec![10]);
        let columns: Vec<_> = pk.columns().into_iter().collect();
        assert_eq!(columns, vec![ChunkPos::new(1, 1)]);
    }

    #[test]
    fn test_columns_at_the_coordinate_edge_wrap() {
        let pk = SubChunk {
            cache_enabled: true,
            dimension: 0,
            position: SubChunkPos::new(i32::MAX, 0, 0),
            entries: vec![entry(1, 0, SubChunkResult::Success, Some(1))],
        };
        let columns: Vec<_> = pk.columns().into_iter().collect();
        assert_eq!(columns, vec![ChunkPos::new(i32::MIN, 0)]);
    }

    #[test]
    fn test_sub_chunk_fill_clears_hashes() {
        let store = BlobStore::in_memory().unwrap();
        store.put(10, b"slice").unwrap();
        let mut pk = SubChunk {
            cache_enabled: true,
            dimension: 0,
            position: SubChunkPos::new(0, 0, 0),
            entries: vec![entry(0, 0, SubChunkResult::Success, Some(10))],
        };
        pk.fill(&store).unwrap();
        assert_eq!(pk.entries[0].raw_payload, b"slice");
        assert_eq!(pk.entries[0].blob_hash, None);
        assert!(!pk.cache_enabled);
    }
}
