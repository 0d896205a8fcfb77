//! Named binary tags as carried by Bedrock.
//!
//! Two flavours exist. Network NBT (block entities inside chunk payloads)
//! uses varints for ints, longs and lengths. Disk NBT (world database) uses
//! fixed-width little-endian integers and `u16` string lengths.

use std::collections::BTreeMap;

use bytes::BufMut;
use serde::{Deserialize, Serialize};

use crate::wire::{
    DecodeError, get_bytes, get_f32_le, get_f64_le, get_i8, get_i16_le, get_len, get_u8,
    get_u32_le, get_varint32, get_varint64, get_varuint32, put_varint32, put_varint64,
    put_varuint32,
};

/// Nesting limit for compounds and lists.
pub const MAX_DEPTH: usize = 512;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

/// Compound payload: tag name to value.
pub type Compound = BTreeMap<String, NbtValue>;

/// A single tag value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NbtValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<u8>),
    String(String),
    List(Vec<NbtValue>),
    Compound(Compound),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl NbtValue {
    fn tag(&self) -> u8 {
        match self {
            NbtValue::Byte(_) => TAG_BYTE,
            NbtValue::Short(_) => TAG_SHORT,
            NbtValue::Int(_) => TAG_INT,
            NbtValue::Long(_) => TAG_LONG,
            NbtValue::Float(_) => TAG_FLOAT,
            NbtValue::Double(_) => TAG_DOUBLE,
            NbtValue::ByteArray(_) => TAG_BYTE_ARRAY,
            NbtValue::String(_) => TAG_STRING,
            NbtValue::List(_) => TAG_LIST,
            NbtValue::Compound(_) => TAG_COMPOUND,
            NbtValue::IntArray(_) => TAG_INT_ARRAY,
            NbtValue::LongArray(_) => TAG_LONG_ARRAY,
        }
    }

    /// Integer view of numeric tags.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            NbtValue::Byte(v) => Some(i64::from(v)),
            NbtValue::Short(v) => Some(i64::from(v)),
            NbtValue::Int(v) => Some(i64::from(v)),
            NbtValue::Long(v) => Some(v),
            _ => None,
        }
    }
}

/// Wire flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NbtEncoding {
    /// Varint flavour used in packets.
    Network,
    /// Fixed-width little-endian flavour used on disk.
    LittleEndian,
}

/// Read one root compound. The root name is discarded.
pub fn read_compound(buf: &mut &[u8], encoding: NbtEncoding) -> Result<Compound, DecodeError> {
    let tag = get_u8(buf)?;
    if tag != TAG_COMPOUND {
        return Err(DecodeError::NbtRootNotCompound(tag));
    }
    read_name(buf, encoding)?;
    match read_payload(buf, TAG_COMPOUND, encoding, 0)? {
        NbtValue::Compound(map) => Ok(map),
        _ => Err(DecodeError::InvalidTag(tag)),
    }
}

/// Read root compounds until the input is exhausted.
pub fn read_all(mut buf: &[u8], encoding: NbtEncoding) -> Result<Vec<Compound>, DecodeError> {
    let mut out = Vec::new();
    while !buf.is_empty() {
        out.push(read_compound(&mut buf, encoding)?);
    }
    Ok(out)
}

/// Append `compound` as a root tag with an empty name.
pub fn write_compound(out: &mut Vec<u8>, compound: &Compound, encoding: NbtEncoding) {
    out.put_u8(TAG_COMPOUND);
    write_name(out, "", encoding);
    write_compound_body(out, compound, encoding);
}

fn read_name(buf: &mut &[u8], encoding: NbtEncoding) -> Result<String, DecodeError> {
    let len = match encoding {
        NbtEncoding::Network => get_varuint32(buf)? as usize,
        NbtEncoding::LittleEndian => get_i16_le(buf)? as u16 as usize,
    };
    String::from_utf8(get_bytes(buf, len)?).map_err(|_| DecodeError::InvalidString)
}

fn write_name(out: &mut Vec<u8>, name: &str, encoding: NbtEncoding) {
    match encoding {
        NbtEncoding::Network => put_varuint32(out, name.len() as u32),
        NbtEncoding::LittleEndian => out.put_u16_le(name.len() as u16),
    }
    out.put_slice(name.as_bytes());
}

fn read_int(buf: &mut &[u8], encoding: NbtEncoding) -> Result<i32, DecodeError> {
    match encoding {
        NbtEncoding::Network => get_varint32(buf),
        NbtEncoding::LittleEndian => Ok(get_u32_le(buf)? as i32),
    }
}

fn read_long(buf: &mut &[u8], encoding: NbtEncoding) -> Result<i64, DecodeError> {
    match encoding {
        NbtEncoding::Network => get_varint64(buf),
        NbtEncoding::LittleEndian => {
            let lo = u64::from(get_u32_le(buf)?);
            let hi = u64::from(get_u32_le(buf)?);
            Ok((hi << 32 | lo) as i64)
        }
    }
}

fn read_array_len(buf: &mut &[u8], encoding: NbtEncoding) -> Result<usize, DecodeError> {
    match encoding {
        NbtEncoding::Network => get_len(buf),
        NbtEncoding::LittleEndian => {
            let len = get_u32_le(buf)? as i32;
            usize::try_from(len).map_err(|_| DecodeError::NegativeLength(i64::from(len)))
        }
    }
}

fn read_payload(
    buf: &mut &[u8],
    tag: u8,
    encoding: NbtEncoding,
    depth: usize,
) -> Result<NbtValue, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::NbtTooDeep(MAX_DEPTH));
    }
    Ok(match tag {
        TAG_BYTE => NbtValue::Byte(get_i8(buf)?),
        TAG_SHORT => NbtValue::Short(get_i16_le(buf)?),
        TAG_INT => NbtValue::Int(read_int(buf, encoding)?),
        TAG_LONG => NbtValue::Long(read_long(buf, encoding)?),
        TAG_FLOAT => NbtValue::Float(get_f32_le(buf)?),
        TAG_DOUBLE => NbtValue::Double(get_f64_le(buf)?),
        TAG_BYTE_ARRAY => {
            let len = read_array_len(buf, encoding)?;
            NbtValue::ByteArray(get_bytes(buf, len)?)
        }
        TAG_STRING => NbtValue::String(read_name(buf, encoding)?),
        TAG_LIST => {
            let elem = get_u8(buf)?;
            let len = read_array_len(buf, encoding)?;
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(read_payload(buf, elem, encoding, depth + 1)?);
            }
            NbtValue::List(items)
        }
        TAG_COMPOUND => {
            let mut map = Compound::new();
            loop {
                let child = get_u8(buf)?;
                if child == TAG_END {
                    break;
                }
                let name = read_name(buf, encoding)?;
                let value = read_payload(buf, child, encoding, depth + 1)?;
                map.insert(name, value);
            }
            NbtValue::Compound(map)
        }
        TAG_INT_ARRAY => {
            let len = read_array_len(buf, encoding)?;
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(read_int(buf, encoding)?);
            }
            NbtValue::IntArray(items)
        }
        TAG_LONG_ARRAY => {
            let len = read_array_len(buf, encoding)?;
            let mut items = Vec::with_capacity(len.min(1024));
            for _ in 0..len {
                items.push(read_long(buf, encoding)?);
            }
            NbtValue::LongArray(items)
        }
        other => return Err(DecodeError::InvalidTag(other)),
    })
}

fn write_int(out: &mut Vec<u8>, value: i32, encoding: NbtEncoding) {
    match encoding {
        NbtEncoding::Network => put_varint32(out, value),
        NbtEncoding::LittleEndian => out.put_i32_le(value),
    }
}

fn write_long(out: &mut Vec<u8>, value: i64, encoding: NbtEncoding) {
    match encoding {
        NbtEncoding::Network => put_varint64(out, value),
        NbtEncoding::LittleEndian => out.put_i64_le(value),
    }
}

fn write_array_len(out: &mut Vec<u8>, len: usize, encoding: NbtEncoding) {
    write_int(out, len as i32, encoding);
}

fn write_compound_body(out: &mut Vec<u8>, compound: &Compound, encoding: NbtEncoding) {
    for (name, value) in compound {
        out.put_u8(value.tag());
        write_name(out, name, encoding);
        write_payload(out, value, encoding);
    }
    out.put_u8(TAG_END);
}

fn write_payload(out: &mut Vec<u8>, value: &NbtValue, encoding: NbtEncoding) {
    match value {
        NbtValue::Byte(v) => out.put_i8(*v),
        NbtValue::Short(v) => out.put_i16_le(*v),
        NbtValue::Int(v) => write_int(out, *v, encoding),
        NbtValue::Long(v) => write_long(out, *v, encoding),
        NbtValue::Float(v) => out.put_f32_le(*v),
        NbtValue::Double(v) => out.put_f64_le(*v),
        NbtValue::ByteArray(v) => {
            write_array_len(out, v.len(), encoding);
            out.put_slice(v);
        }
        NbtValue::String(v) => write_name(out, v, encoding),
        NbtValue::List(items) => {
            out.put_u8(items.first().map_or(TAG_END, NbtValue::tag));
            write_array_len(out, items.len(), encoding);
            for item in items {
                write_payload(out, item, encoding);
            }
        }
        NbtValue::Compound(map) => write_compound_body(out, map, encoding),
        NbtValue::IntArray(items) => {
            write_array_len(out, items.len(), encoding);
            for item in items {
                write_int(out, *item, encoding);
            }
        }
        NbtValue::LongArray(items) => {
            write_array_len(out, items.len(), encoding);
            for item in items {
                write_long(out, *item, encoding);
            }
        }
    }
}
