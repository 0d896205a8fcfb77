//! Whole chunk columns.
//!
//! A column payload is laid out as `sub_chunk_count` slices, then biomes
//! (256 legacy bytes before 1.18, one paletted storage per slice after),
//! then a border-block list, then block entities until the end.

use bytes::BufMut;

use crate::dimension::HeightRange;
use crate::nbt::{Compound, NbtEncoding, read_all};
use crate::palette::{COPY_PREVIOUS, PalettedStorage};
use crate::sub_chunk::SubChunk;
use crate::wire::{DecodeError, get_bytes, get_u8};

/// Legacy 2-D biome bytes per column.
pub const LEGACY_BIOME_LEN: usize = 256;

/// Biome data attached to a column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Biomes {
    /// One byte per X/Z column.
    Legacy(Vec<u8>),
    /// One 3-D storage per slice, bottom first.
    Modern(Vec<PalettedStorage>),
    /// The payload carried none.
    #[default]
    Absent,
}

/// A chunk column: one slice per 16 blocks of the dimension's height.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    range: HeightRange,
    air: u32,
    sub_chunks: Vec<SubChunk>,
    biomes: Biomes,
}

/// Result of decoding a column payload.
#[derive(Debug, Clone)]
pub struct DecodedChunk {
    /// The column.
    pub chunk: Chunk,
    /// Block entities from the payload tail.
    pub block_nbt: Vec<Compound>,
}

impl Chunk {
    /// Column of air spanning `range`.
    pub fn new(range: HeightRange, air: u32) -> Self {
        Self {
            range,
            air,
            sub_chunks: vec![SubChunk::empty(air); range.sub_chunk_count()],
            biomes: Biomes::Absent,
        }
    }

    /// Height range.
    pub fn range(&self) -> HeightRange {
        self.range
    }

    /// Air runtime id used for empty slices.
    pub fn air(&self) -> u32 {
        self.air
    }

    /// Biome data.
    pub fn biomes(&self) -> &Biomes {
        &self.biomes
    }

    /// Slices bottom to top, paired with their absolute slice index.
    pub fn sub_chunks(&self) -> impl Iterator<Item = (i32, &SubChunk)> {
        let min = self.range.min_sub_chunk();
        self.sub_chunks
            .iter()
            .enumerate()
            .map(move |(i, sub)| (min + i as i32, sub))
    }

    fn slot(&self, y: i32) -> Option<usize> {
        let idx = y - self.range.min_sub_chunk();
        usize::try_from(idx)
            .ok()
            .filter(|&idx| idx < self.sub_chunks.len())
    }

    /// Replace the slice at absolute index `y`. Returns `false` when `y`
    /// lies outside the column.
    pub fn set_sub_chunk(&mut self, y: i32, sub_chunk: SubChunk) -> bool {
        match self.slot(y) {
            Some(idx) => {
                self.sub_chunks[idx] = sub_chunk;
                true
            }
            None => false,
        }
    }

    /// Reset the slice at absolute index `y` to air.
    pub fn clear_sub_chunk(&mut self, y: i32) -> bool {
        let air = self.air;
        self.set_sub_chunk(y, SubChunk::empty(air))
    }

    /// Whether every slice is air.
    pub fn is_empty(&self) -> bool {
        self.sub_chunks.iter().all(|sub| sub.is_empty(self.air))
    }

    /// Highest non-air block at a local X/Z as `(block_y, runtime_id)`.
    pub fn highest_block(&self, x: u8, z: u8) -> Option<(i32, u32)> {
        let min = self.range.min_sub_chunk();
        for (i, sub) in self.sub_chunks.iter().enumerate().rev() {
            if sub.is_empty(self.air) {
                continue;
            }
            let y_index = min + i as i32;
            for y in (0..16u8).rev() {
                let rid = sub.block(x, y, z, self.air);
                if rid != self.air {
                    return Some((y_index * 16 + i32::from(y), rid));
                }
            }
        }
        None
    }

    /// Highest non-air block Y per column, `range.min` where there is none.
    /// Index is `x * 16 + z`.
    pub fn heightmap(&self) -> [i16; 256] {
        let mut heights = [self.range.min as i16; 256];
        for x in 0..16u8 {
            for z in 0..16u8 {
                if let Some((y, _)) = self.highest_block(x, z) {
                    heights[usize::from(x) * 16 + usize::from(z)] = y as i16;
                }
            }
        }
        heights
    }

    /// Heightmap followed by the biome data, in the column's biome flavour.
    pub fn encode_biomes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(512 + LEGACY_BIOME_LEN);
        for h in self.heightmap() {
            out.put_i16_le(h);
        }
        match &self.biomes {
            Biomes::Legacy(bytes) => out.put_slice(bytes),
            Biomes::Modern(storages) => {
                for storage in storages {
                    storage.encode_network(&mut out);
                }
            }
            Biomes::Absent => {}
        }
        out
    }

    /// Decode a column payload holding `sub_chunk_count` inline slices.
    pub fn decode(
        mut payload: &[u8],
        sub_chunk_count: usize,
        range: HeightRange,
        pre_118: bool,
        air: u32,
    ) -> Result<DecodedChunk, DecodeError> {
        let buf = &mut payload;
        let mut chunk = Chunk::new(range, air);
        let min = range.min_sub_chunk();

        for i in 0..sub_chunk_count {
            let (sub, y_index) = SubChunk::decode(buf)?;
            let y = y_index.map_or(min + i as i32, i32::from);
            if !chunk.set_sub_chunk(y, sub) {
                tracing::debug!("Dropping slice {y} outside {}..{}", range.min, range.max);
            }
        }

        chunk.biomes = if pre_118 {
            if buf.len() >= LEGACY_BIOME_LEN {
                Biomes::Legacy(get_bytes(buf, LEGACY_BIOME_LEN)?)
            } else {
                Biomes::Absent
            }
        } else {
            decode_biomes(buf, range.sub_chunk_count())?
        };

        if !buf.is_empty() {
            let border = usize::from(get_u8(buf)?);
            get_bytes(buf, border)?;
        }
        let block_nbt = read_all(buf, NbtEncoding::Network)?;
        Ok(DecodedChunk { chunk, block_nbt })
    }
}

fn decode_biomes(buf: &mut &[u8], count: usize) -> Result<Biomes, DecodeError> {
    let mut storages: Vec<PalettedStorage> = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.is_empty() {
            break;
        }
        let header = get_u8(buf)?;
        if header == COPY_PREVIOUS {
            let prev = storages.last().cloned().ok_or(DecodeError::NoPreviousBiome)?;
            storages.push(prev);
        } else {
            storages.push(PalettedStorage::decode_body(buf, header)?);
        }
    }
    Ok(if storages.is_empty() {
        Biomes::Absent
    } else {
        Biomes::Modern(storages)
    })
}
