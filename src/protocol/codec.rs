//! Length-prefixed frame codec
//!
//! Two forms are provided:
//!
//! - [`read_frame`]/[`write_frame`]: one-shot helpers over any `AsyncRead` /
//!   `AsyncWrite`. `read_frame` uses `read_exact` and is not cancel-safe.
//! - [`FrameReader`]/[`FrameWriter`]: the buffered forms used by the channel
//!   workers. `FrameReader::read_frame` keeps partial input in its own buffer
//!   and `FrameWriter::flush` keeps unwritten output in its own, so either can
//!   be raced against a timeout or a stop signal and resumed later without
//!   losing or duplicating bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::constants::{HEADER_SIZE, MAX_REPRESENTABLE_FRAME_SIZE, READ_BUFFER_SIZE};

/// Encode the header for a payload of `len` bytes
///
/// Fails with `PayloadTooLarge` if `len` exceeds `max` or cannot be
/// represented in the 4-byte header.
pub fn encode_header(len: usize, max: usize) -> Result<[u8; HEADER_SIZE]> {
    let max = max.min(MAX_REPRESENTABLE_FRAME_SIZE);
    if len > max {
        return Err(ProtocolError::PayloadTooLarge { len, max }.into());
    }
    Ok((len as u32).to_be_bytes())
}

/// Try to take one complete frame off the front of `buf`
///
/// Returns `Ok(None)` if more bytes are needed. The declared length is checked
/// as soon as the header is available, before any payload is buffered.
pub fn decode_frame(buf: &mut BytesMut, max: usize) -> Result<Option<Bytes>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > max {
        return Err(ProtocolError::FrameTooLarge { len, max }.into());
    }

    let total = HEADER_SIZE + len;
    if buf.len() < total {
        buf.reserve(total - buf.len());
        return Ok(None);
    }

    buf.advance(HEADER_SIZE);
    Ok(Some(buf.split_to(len).freeze()))
}

/// Write one frame (header then payload) and flush
///
/// Oversized payloads are rejected before anything is written.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8], max: usize) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let header = encode_header(payload.len(), max)?;
    writer.write_all(&header).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one frame
///
/// A close before the header or inside the payload yields
/// `Error::ConnectionClosed`; a truncated payload is never returned.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let len = u32::from_be_bytes(header) as usize;
    if len > max {
        return Err(ProtocolError::FrameTooLarge { len, max }.into());
    }

    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;
    Ok(payload.freeze())
}

/// Buffered, cancel-safe frame reader
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_frame_size: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a read half
    pub fn new(inner: R, max_frame_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            max_frame_size,
        }
    }

    /// Read the next frame
    ///
    /// Cancel-safe: dropping the future keeps every byte read so far, and the
    /// next call continues where this one stopped.
    pub async fn read_frame(&mut self) -> Result<Bytes> {
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.max_frame_size)? {
                return Ok(frame);
            }

            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                if !self.buf.is_empty() {
                    tracing::debug!(buffered = self.buf.len(), "Peer closed mid-frame");
                }
                return Err(Error::ConnectionClosed);
            }
        }
    }

    /// Bytes received but not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Configured frame size limit
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

/// Buffered, resumable frame writer
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
    max_frame_size: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Wrap a write half
    pub fn new(inner: W, max_frame_size: usize) -> Self {
        Self {
            inner,
            buf: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Append one frame to the output buffer without writing it
    ///
    /// Oversized payloads are rejected and nothing is buffered.
    pub fn queue_frame(&mut self, payload: &[u8]) -> Result<()> {
        let header = encode_header(payload.len(), self.max_frame_size)?;
        self.buf.reserve(HEADER_SIZE + payload.len());
        self.buf.put_slice(&header);
        self.buf.put_slice(payload);
        Ok(())
    }

    /// Write out everything buffered, then flush the transport
    ///
    /// Cancel-safe: bytes not yet accepted by the transport stay buffered and
    /// the next call picks up where this one stopped.
    pub async fn flush(&mut self) -> Result<()> {
        while self.buf.has_remaining() {
            if self.inner.write_buf(&mut self.buf).await? == 0 {
                return Err(std::io::Error::from(std::io::ErrorKind::WriteZero).into());
            }
        }
        self.inner.flush().await?;
        Ok(())
    }

    /// Write one frame and flush
    ///
    /// Anything left over from an interrupted write goes out first.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        self.queue_frame(payload)?;
        self.flush().await
    }

    /// Bytes queued but not yet accepted by the transport
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Shut down the write direction
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Configured frame size limit
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}
