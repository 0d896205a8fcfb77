//! Paletted 16×16×16 storages.
//!
//! A storage packs 4096 palette indices into 32-bit words, `32 / bits`
//! indices per word with the remaining high bits unused. Index order is
//! `(x << 8) | (z << 4) | y`.

use bytes::{Buf, BufMut};

use crate::wire::{DecodeError, get_bytes, get_u8, get_varint32, put_varint32};

/// Values in one storage.
pub const STORAGE_VOLUME: usize = 4096;

/// Bit widths Bedrock accepts, smallest first.
const VALID_BITS: [u8; 9] = [0, 1, 2, 3, 4, 5, 6, 8, 16];

/// Header marking a biome storage that repeats the previous one.
pub(crate) const COPY_PREVIOUS: u8 = 0x7f;

/// One layer of values addressed by block position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalettedStorage {
    bits: u8,
    words: Vec<u32>,
    palette: Vec<u32>,
}

fn word_count(bits: u8) -> usize {
    if bits == 0 {
        return 0;
    }
    let per_word = 32 / usize::from(bits);
    STORAGE_VOLUME.div_ceil(per_word)
}

/// Flat index of a block inside a sub-chunk.
pub fn block_index(x: u8, y: u8, z: u8) -> usize {
    (usize::from(x & 15) << 8) | (usize::from(z & 15) << 4) | usize::from(y & 15)
}

impl PalettedStorage {
    /// Storage where every position holds `value`.
    pub fn uniform(value: u32) -> Self {
        Self {
            bits: 0,
            words: Vec::new(),
            palette: vec![value],
        }
    }

    /// Build from one value per position, in index order.
    pub fn from_values(values: &[u32; STORAGE_VOLUME]) -> Self {
        let mut palette: Vec<u32> = Vec::new();
        let mut indices = Vec::with_capacity(STORAGE_VOLUME);
        for value in values {
            let idx = match palette.iter().position(|p| p == value) {
                Some(idx) => idx,
                None => {
                    palette.push(*value);
                    palette.len() - 1
                }
            };
            indices.push(idx as u32);
        }
        if palette.len() == 1 {
            return Self::uniform(palette[0]);
        }
        let bits = VALID_BITS
            .iter()
            .copied()
            .find(|&b| b > 0 && (1usize << b) >= palette.len())
            .unwrap_or(16);
        let per_word = 32 / usize::from(bits);
        let mut words = vec![0u32; word_count(bits)];
        for (i, idx) in indices.into_iter().enumerate() {
            words[i / per_word] |= idx << ((i % per_word) * usize::from(bits));
        }
        Self {
            bits,
            words,
            palette,
        }
    }

    /// Bits per packed index.
    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Distinct values, in palette order.
    pub fn palette(&self) -> &[u32] {
        &self.palette
    }

    /// Whether every position holds the same value.
    pub fn is_uniform(&self) -> bool {
        self.palette.len() == 1
    }

    /// Value at a flat index.
    pub fn get_index(&self, index: usize) -> u32 {
        if self.bits == 0 {
            return self.palette.first().copied().unwrap_or(0);
        }
        let bits = usize::from(self.bits);
        let per_word = 32 / bits;
        let word = self.words.get(index / per_word).copied().unwrap_or(0);
        let mask = (1u32 << bits) - 1;
        let idx = (word >> ((index % per_word) * bits)) & mask;
        self.palette.get(idx as usize).copied().unwrap_or(0)
    }

    /// Value at a block position.
    pub fn get(&self, x: u8, y: u8, z: u8) -> u32 {
        self.get_index(block_index(x, y, z))
    }

    /// Decode a network storage whose header byte was already read.
    pub(crate) fn decode_body(buf: &mut &[u8], header: u8) -> Result<Self, DecodeError> {
        if header & 1 == 0 {
            return Err(DecodeError::PersistentPalette);
        }
        let bits = header >> 1;
        if !VALID_BITS.contains(&bits) {
            return Err(DecodeError::InvalidBitsPerBlock(bits));
        }
        let words_len = word_count(bits);
        let raw = get_bytes(buf, words_len * 4)?;
        let mut raw = raw.as_slice();
        let mut words = Vec::with_capacity(words_len);
        while raw.has_remaining() {
            words.push(raw.get_u32_le());
        }

        let count = if bits == 0 {
            1
        } else {
            let count = get_varint32(buf)?;
            usize::try_from(count).map_err(|_| DecodeError::NegativeLength(i64::from(count)))?
        };
        let mut palette = Vec::with_capacity(count.min(STORAGE_VOLUME));
        for _ in 0..count {
            palette.push(get_varint32(buf)? as u32);
        }

        let storage = Self {
            bits,
            words,
            palette,
        };
        storage.check_indices()?;
        Ok(storage)
    }

    /// Decode one network storage including its header byte.
    pub fn decode_network(buf: &mut &[u8]) -> Result<Self, DecodeError> {
        let header = get_u8(buf)?;
        Self::decode_body(buf, header)
    }

    /// Append the network encoding of this storage.
    pub fn encode_network(&self, out: &mut Vec<u8>) {
        out.put_u8((self.bits << 1) | 1);
        for word in &self.words {
            out.put_u32_le(*word);
        }
        if self.bits != 0 {
            put_varint32(out, self.palette.len() as i32);
        }
        for value in &self.palette {
            put_varint32(out, *value as i32);
        }
    }

    fn check_indices(&self) -> Result<(), DecodeError> {
        if self.bits == 0 {
            return Ok(());
        }
        let bits = usize::from(self.bits);
        let per_word = 32 / bits;
        let mask = (1u32 << bits) - 1;
        for index in 0..STORAGE_VOLUME {
            let word = self.words[index / per_word];
            let idx = (word >> ((index % per_word) * bits)) & mask;
            if idx as usize >= self.palette.len() {
                return Err(DecodeError::PaletteIndex {
                    index: idx,
                    len: self.palette.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_counts_match_padding_rules() {
        assert_eq!(word_count(1), 128);
        assert_eq!(word_count(3), 410);
        assert_eq!(word_count(5), 683);
        assert_eq!(word_count(6), 683);
        assert_eq!(word_count(16), 2048);
    }

    #[test]
    fn test_single_value_storage() {
        let mut out = Vec::new();
        PalettedStorage::uniform(42).encode_network(&mut out);
        // header 0b1, one zigzag varint entry
        assert_eq!(out, [0x01, 84]);
        let storage = PalettedStorage::decode_network(&mut out.as_slice()).unwrap();
        assert!(storage.is_uniform());
        assert_eq!(storage.get(15, 15, 15), 42);
    }

    #[test]
    fn test_packed_storage_lookup() {
        let mut values = [7u32; STORAGE_VOLUME];
        values[block_index(1, 2, 3)] = 9;
        values[block_index(15, 0, 15)] = 11;
        let storage = PalettedStorage::from_values(&values);
        assert_eq!(storage.bits(), 2);

        let mut out = Vec::new();
        storage.encode_network(&mut out);
        let decoded = PalettedStorage::decode_network(&mut out.as_slice()).unwrap();
        assert_eq!(decoded.get(1, 2, 3), 9);
        assert_eq!(decoded.get(15, 0, 15), 11);
        assert_eq!(decoded.get(0, 0, 0), 7);
        assert_eq!(decoded.palette(), &[7, 9, 11]);
    }

    #[test]
    fn test_three_bit_storage_uses_padded_words() {
        let mut values = [0u32; STORAGE_VOLUME];
        for (i, v) in values.iter_mut().enumerate() {
            *v = (i % 5) as u32;
        }
        let storage = PalettedStorage::from_values(&values);
        assert_eq!(storage.bits(), 3);
        let mut out = Vec::new();
        storage.encode_network(&mut out);
        assert_eq!(out.len(), 1 + 410 * 4 + 1 + 5);
        let decoded = PalettedStorage::decode_network(&mut out.as_slice()).unwrap();
        assert_eq!(decoded.get_index(4095), (4095 % 5) as u32);
    }

    #[test]
    fn test_persistent_palette_rejected() {
        let mut cursor: &[u8] = &[0x00, 0x0a];
        assert!(matches!(
            PalettedStorage::decode_network(&mut cursor),
            Err(DecodeError::PersistentPalette)
        ));
    }

    #[test]
    fn test_invalid_bit_width_rejected() {
        let mut cursor: &[u8] = &[(7 << 1) | 1];
        assert!(matches!(
            PalettedStorage::decode_network(&mut cursor),
            Err(DecodeError::InvalidBitsPerBlock(7))
        ));
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let mut data = vec![(1 << 1) | 1];
        data.extend_from_slice(&[0xff; 128 * 4]);
        put_varint32(&mut data, 1);
        put_varint32(&mut data, 5);
        assert!(matches!(
            PalettedStorage::decode_network(&mut data.as_slice()),
            Err(DecodeError::PaletteIndex { index: 1, len: 1 })
        ));
    }
}
