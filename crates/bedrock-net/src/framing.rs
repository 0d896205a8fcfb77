//! Length-prefixed framing for relay streams.
//!
//! Every packet on the wire is carried in one frame:
//!
//! ```text
//! +------------------------+--------------------+
//! | length (1-5 bytes)     |   payload          |
//! | unsigned LEB128 varint |   (length bytes)   |
//! +------------------------+--------------------+
//! ```
//!
//! The prefix is the same unsigned variable-length integer Bedrock uses for
//! packet lengths inside a batch. It does **not** include its own bytes.
//! A length of 0 is a valid empty frame.

use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Longest encoding of a `u32` varint.
pub const MAX_VARINT_LEN: usize = 5;

/// Configuration for the framing layer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum allowed payload size in bytes. Default: 16 MiB.
    pub max_payload_size: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: 16 * 1024 * 1024,
        }
    }
}

/// Errors that can occur during framing operations.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload size exceeds the configured maximum.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// The actual payload size.
        size: u32,
        /// The configured maximum.
        max: u32,
    },

    /// The length prefix did not terminate within five bytes.
    #[error("length prefix longer than {MAX_VARINT_LEN} bytes")]
    VarIntTooLong,

    /// The connection was closed before a complete frame was received.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Append the varint encoding of `value` to `out`.
pub fn put_varuint32(out: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn map_eof(e: std::io::Error) -> FrameError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        FrameError::ConnectionClosed
    } else {
        FrameError::Io(e)
    }
}

async fn read_varuint32<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<u32, FrameError> {
    let mut value: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        let byte = reader.read_u8().await.map_err(map_eof)?;
        value |= u32::from(byte & 0x7f) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(FrameError::VarIntTooLong)
}

/// Read a single length-prefixed frame from the stream.
///
/// Returns [`FrameError::ConnectionClosed`] if the peer closes the connection
/// before the frame is complete.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let payload_len = read_varuint32(reader).await?;

    if payload_len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: config.max_payload_size,
        });
    }

    let mut payload = vec![0u8; payload_len as usize];
    if payload_len > 0 {
        reader.read_exact(&mut payload).await.map_err(map_eof)?;
    }

    Ok(payload)
}

/// Write a single length-prefixed frame to the stream and flush it.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    if len > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: len,
            max: config.max_payload_size,
        });
    }

    let mut frame = Vec::with_capacity(MAX_VARINT_LEN + payload.len());
    put_varuint32(&mut frame, len);
    frame.extend_from_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;

    Ok(())
}
