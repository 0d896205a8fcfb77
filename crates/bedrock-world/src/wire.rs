//! Primitive readers and writers for Bedrock network payloads.
//!
//! Readers take a `&mut &[u8]` cursor and fail with
//! [`DecodeError::UnexpectedEof`] instead of panicking on short input.

use bytes::{Buf, BufMut};

/// Errors raised while decoding chunk payloads.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Input ended early.
    #[error("unexpected end of data: needed {needed} bytes, {remaining} left")]
    UnexpectedEof {
        /// Bytes the read required.
        needed: usize,
        /// Bytes that were left.
        remaining: usize,
    },

    /// A varint did not terminate.
    #[error("varint too long")]
    VarIntTooLong,

    /// A length prefix was negative.
    #[error("negative length {0}")]
    NegativeLength(i64),

    /// Storage header named an unsupported bit width.
    #[error("invalid bits per block {0}")]
    InvalidBitsPerBlock(u8),

    /// A packed index pointed past the end of the palette.
    #[error("palette index {index} out of range for palette of {len}")]
    PaletteIndex {
        /// Index found in the packed words.
        index: u32,
        /// Palette length.
        len: usize,
    },

    /// Palette stored as NBT states rather than runtime ids.
    #[error("persistent palette in a network payload")]
    PersistentPalette,

    /// Sub-chunk version byte not understood.
    #[error("unsupported sub-chunk version {0}")]
    UnsupportedSubChunkVersion(u8),

    /// Biome storage asked to copy a previous storage that does not exist.
    #[error("biome storage refers to a missing previous storage")]
    NoPreviousBiome,

    /// Unknown NBT tag type.
    #[error("invalid NBT tag type {0}")]
    InvalidTag(u8),

    /// NBT nested too deeply.
    #[error("NBT nested deeper than {0} levels")]
    NbtTooDeep(usize),

    /// NBT root was not a compound.
    #[error("NBT root is tag {0}, expected a compound")]
    NbtRootNotCompound(u8),

    /// A string was not valid UTF-8.
    #[error("invalid UTF-8 in string")]
    InvalidString,
}

fn ensure(buf: &[u8], needed: usize) -> Result<(), DecodeError> {
    if buf.remaining() < needed {
        return Err(DecodeError::UnexpectedEof {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut &[u8]) -> Result<u8, DecodeError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_i8(buf: &mut &[u8]) -> Result<i8, DecodeError> {
    ensure(buf, 1)?;
    Ok(buf.get_i8())
}

pub(crate) fn get_i16_le(buf: &mut &[u8]) -> Result<i16, DecodeError> {
    ensure(buf, 2)?;
    Ok(buf.get_i16_le())
}

pub(crate) fn get_u32_le(buf: &mut &[u8]) -> Result<u32, DecodeError> {
    ensure(buf, 4)?;
    Ok(buf.get_u32_le())
}

pub(crate) fn get_f32_le(buf: &mut &[u8]) -> Result<f32, DecodeError> {
    ensure(buf, 4)?;
    Ok(buf.get_f32_le())
}

pub(crate) fn get_f64_le(buf: &mut &[u8]) -> Result<f64, DecodeError> {
    ensure(buf, 8)?;
    Ok(buf.get_f64_le())
}

pub(crate) fn get_bytes(buf: &mut &[u8], len: usize) -> Result<Vec<u8>, DecodeError> {
    ensure(buf, len)?;
    let out = buf[..len].to_vec();
    buf.advance(len);
    Ok(out)
}

pub(crate) fn get_varuint64(buf: &mut &[u8]) -> Result<u64, DecodeError> {
    let mut value = 0u64;
    for shift in (0..70).step_by(7) {
        let byte = get_u8(buf)?;
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(DecodeError::VarIntTooLong)
}

pub(crate) fn get_varuint32(buf: &mut &[u8]) -> Result<u32, DecodeError> {
    let mut value = 0u32;
    for shift in (0..35).step_by(7) {
        let byte = get_u8(buf)?;
        value |= u32::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(DecodeError::VarIntTooLong)
}

pub(crate) fn get_varint32(buf: &mut &[u8]) -> Result<i32, DecodeError> {
    let raw = get_varuint32(buf)?;
    Ok((raw >> 1) as i32 ^ -((raw & 1) as i32))
}

pub(crate) fn get_varint64(buf: &mut &[u8]) -> Result<i64, DecodeError> {
    let raw = get_varuint64(buf)?;
    Ok((raw >> 1) as i64 ^ -((raw & 1) as i64))
}

/// Read a zigzag varint length and reject negatives.
pub(crate) fn get_len(buf: &mut &[u8]) -> Result<usize, DecodeError> {
    let len = get_varint32(buf)?;
    usize::try_from(len).map_err(|_| DecodeError::NegativeLength(i64::from(len)))
}

pub(crate) fn get_string(buf: &mut &[u8]) -> Result<String, DecodeError> {
    let len = get_varuint32(buf)? as usize;
    let bytes = get_bytes(buf, len)?;
    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidString)
}

pub(crate) fn put_varuint64(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.put_u8((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.put_u8(value as u8);
}

pub(crate) fn put_varuint32(out: &mut Vec<u8>, value: u32) {
    put_varuint64(out, u64::from(value));
}

pub(crate) fn put_varint32(out: &mut Vec<u8>, value: i32) {
    put_varuint32(out, ((value << 1) ^ (value >> 31)) as u32);
}

pub(crate) fn put_varint64(out: &mut Vec<u8>, value: i64) {
    put_varuint64(out, ((value << 1) ^ (value >> 63)) as u64);
}

pub(crate) fn put_string(out: &mut Vec<u8>, value: &str) {
    put_varuint32(out, value.len() as u32);
    out.put_slice(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zigzag_varint32() {
        for value in [0, 1, -1, 63, -64, 300, i32::MAX, i32::MIN] {
            let mut out = Vec::new();
            put_varint32(&mut out, value);
            let mut cursor = out.as_slice();
            assert_eq!(get_varint32(&mut cursor).unwrap(), value);
            assert!(cursor.is_empty());
        }
    }

    #[test]
    fn test_zigzag_encoding_of_small_values() {
        let mut out = Vec::new();
        put_varint32(&mut out, -1);
        assert_eq!(out, [0x01]);
        out.clear();
        put_varint32(&mut out, 1);
        assert_eq!(out, [0x02]);
    }

    #[test]
    fn test_short_input_is_an_error() {
        let mut cursor: &[u8] = &[1, 2];
        assert!(matches!(
            get_u32_le(&mut cursor),
            Err(DecodeError::UnexpectedEof {
                needed: 4,
                remaining: 2
            })
        ));
    }

    #[test]
    fn test_unterminated_varint() {
        let mut cursor: &[u8] = &[0xff; 6];
        assert!(matches!(
            get_varuint32(&mut cursor),
            Err(DecodeError::VarIntTooLong)
        ));
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut out = Vec::new();
        put_varint32(&mut out, -3);
        let mut cursor = out.as_slice();
        assert!(matches!(
            get_len(&mut cursor),
            Err(DecodeError::NegativeLength(-3))
        ));
    }
}
