//! Vertical 16-block slices of a column.

use bytes::BufMut;

use crate::nbt::{Compound, NbtEncoding, read_all};
use crate::palette::PalettedStorage;
use crate::wire::{DecodeError, get_i8, get_u8};

/// Slice format written by [`SubChunk::encode`].
pub const SUB_CHUNK_VERSION: u8 = 9;

/// One 16×16×16 slice: a block layer plus optional extra layers (water).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubChunk {
    layers: Vec<PalettedStorage>,
}

/// A decoded slice and the trailing block entities that followed it.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSubChunk {
    /// The slice.
    pub sub_chunk: SubChunk,
    /// Y index carried by version 9 payloads.
    pub y_index: Option<i8>,
    /// Block entities found after the slice.
    pub block_nbt: Vec<Compound>,
}

impl SubChunk {
    /// Slice filled with `air`.
    pub fn empty(air: u32) -> Self {
        Self {
            layers: vec![PalettedStorage::uniform(air)],
        }
    }

    /// Slice from explicit layers. The first layer holds blocks.
    pub fn from_layers(layers: Vec<PalettedStorage>) -> Self {
        Self { layers }
    }

    /// All layers.
    pub fn layers(&self) -> &[PalettedStorage] {
        &self.layers
    }

    /// Runtime id of the block at a local position.
    pub fn block(&self, x: u8, y: u8, z: u8, air: u32) -> u32 {
        self.layers.first().map_or(air, |layer| layer.get(x, y, z))
    }

    /// Whether every layer is uniformly `air`.
    pub fn is_empty(&self, air: u32) -> bool {
        self.layers
            .iter()
            .all(|layer| layer.is_uniform() && layer.palette()[0] == air)
    }

    /// Decode one slice from a network payload without trailing data.
    pub fn decode(buf: &mut &[u8]) -> Result<(Self, Option<i8>), DecodeError> {
        let version = get_u8(buf)?;
        let (count, y_index) = match version {
            1 => (1, None),
            8 => (get_u8(buf)?, None),
            9 => {
                let count = get_u8(buf)?;
                (count, Some(get_i8(buf)?))
            }
            other => return Err(DecodeError::UnsupportedSubChunkVersion(other)),
        };
        let mut layers = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            layers.push(PalettedStorage::decode_network(buf)?);
        }
        Ok((Self { layers }, y_index))
    }

    /// Decode a sub-chunk packet entry: one slice, then block entities.
    pub fn decode_entry(mut payload: &[u8]) -> Result<DecodedSubChunk, DecodeError> {
        let (sub_chunk, y_index) = Self::decode(&mut payload)?;
        let block_nbt = read_all(payload, NbtEncoding::Network)?;
        Ok(DecodedSubChunk {
            sub_chunk,
            y_index,
            block_nbt,
        })
    }

    /// Network encoding tagged with `y_index`.
    pub fn encode(&self, y_index: i8) -> Vec<u8> {
        let mut out = Vec::new();
        out.put_u8(SUB_CHUNK_VERSION);
        out.put_u8(self.layers.len() as u8);
        out.put_i8(y_index);
        for layer in &self.layers {
            layer.encode_network(&mut out);
        }
        out
    }
}
