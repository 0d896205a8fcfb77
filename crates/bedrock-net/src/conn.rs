//! Framed packet connections.
//!
//! A connection is split into a [`PacketSource`] owned by exactly one reading
//! task and a [`PacketSink`] shared by every task that writes. Sinks serialize
//! concurrent writers with an internal mutex so a frame is never interleaved
//! with another.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;

use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};
use crate::protocol::{Packet, PacketCodec, PacketError};

/// Errors that can occur on a packet connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Framing failed.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// A frame did not hold a valid packet.
    #[error("malformed packet: {0}")]
    Packet(#[from] PacketError),

    /// Socket setup failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnError {
    /// Whether the peer closed the connection cleanly between frames.
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnError::Frame(FrameError::ConnectionClosed))
    }
}

/// Reading half of a packet connection.
#[async_trait]
pub trait PacketSource: Send {
    /// Wait for the next packet.
    async fn read_packet(&mut self) -> Result<Packet, ConnError>;
}

/// Writing half of a packet connection. Safe to share between tasks.
#[async_trait]
pub trait PacketSink: Send + Sync {
    /// Encode and write one packet.
    async fn write_packet(&self, packet: &Packet) -> Result<(), ConnError>;

    /// Shut the write side down. Further writes fail.
    async fn close(&self) -> Result<(), ConnError>;
}

/// [`PacketSource`] over any byte stream.
pub struct FramedReader<R> {
    reader: R,
    codec: PacketCodec,
    frame: FrameConfig,
}

impl<R> FramedReader<R> {
    /// Wraps a reader.
    pub fn new(reader: R, codec: PacketCodec, frame: FrameConfig) -> Self {
        Self {
            reader,
            codec,
            frame,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> PacketSource for FramedReader<R> {
    async fn read_packet(&mut self) -> Result<Packet, ConnError> {
        let payload = read_frame(&mut self.reader, &self.frame).await?;
        Ok(self.codec.decode(&payload)?)
    }
}

/// [`PacketSink`] over any byte stream.
pub struct FramedWriter<W> {
    writer: Mutex<W>,
    codec: PacketCodec,
    frame: FrameConfig,
}

impl<W> FramedWriter<W> {
    /// Wraps a writer.
    pub fn new(writer: W, codec: PacketCodec, frame: FrameConfig) -> Self {
        Self {
            writer: Mutex::new(writer),
            codec,
            frame,
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> PacketSink for FramedWriter<W> {
    async fn write_packet(&self, packet: &Packet) -> Result<(), ConnError> {
        let payload = self.codec.encode(packet)?;
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &payload, &self.frame).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnError> {
        self.writer.lock().await.shutdown().await?;
        Ok(())
    }
}

/// Reading half of a TCP packet connection.
pub type TcpPacketReader = FramedReader<OwnedReadHalf>;

/// Writing half of a TCP packet connection.
pub type TcpPacketWriter = FramedWriter<OwnedWriteHalf>;

/// Split an established stream into framed packet halves.
pub fn split_tcp(
    stream: TcpStream,
    codec: PacketCodec,
    frame: FrameConfig,
) -> std::io::Result<(TcpPacketReader, TcpPacketWriter)> {
    stream.set_nodelay(true)?;
    let (reader, writer) = stream.into_split();
    Ok((
        FramedReader::new(reader, codec, frame.clone()),
        FramedWriter::new(writer, codec, frame),
    ))
}

/// Connect to `addr` and return framed packet halves.
pub async fn connect(
    addr: &str,
    codec: PacketCodec,
    frame: FrameConfig,
) -> Result<(TcpPacketReader, TcpPacketWriter, SocketAddr), ConnError> {
    let stream = TcpStream::connect(addr).await?;
    let peer = stream.peer_addr()?;
    let (reader, writer) = split_tcp(stream, codec, frame)?;
    tracing::info!("Connected to upstream {peer}");
    Ok((reader, writer, peer))
}
