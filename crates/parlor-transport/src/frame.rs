//! Length-prefixed framing over any byte stream.
//!
//! Every socket in Parlor speaks the same framing: a 4-byte big-endian
//! length header followed by exactly that many bytes of payload.
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┐
//! │ len: u32 (BE)│ payload: [u8; len]           │
//! └──────────────┴──────────────────────────────┘
//! ```
//!
//! [`FrameReader`] and [`FrameWriter`] are generic over `AsyncRead` /
//! `AsyncWrite`, so the same code frames TCP sockets and the stdout pipe
//! of a spawned game-server process.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::TransportError;

/// Size of the length header in bytes.
pub const HEADER_LEN: usize = 4;

/// Default upper bound on a single frame body (4 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Framing limits shared by readers and writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Largest frame body accepted or produced, in bytes.
    pub max_frame_len: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl FrameConfig {
    /// Checks a declared body length against the limits.
    pub fn check_len(&self, len: usize) -> Result<(), TransportError> {
        if len == 0 {
            return Err(TransportError::EmptyFrame);
        }
        if len > self.max_frame_len || u32::try_from(len).is_err() {
            return Err(TransportError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FrameReader
// ---------------------------------------------------------------------------

/// Reads whole frames from a byte stream.
///
/// A frame is only returned once its full declared length has arrived.
pub struct FrameReader<R> {
    inner: R,
    config: FrameConfig,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Reads the next frame body.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly on a frame
    /// boundary. An end of stream anywhere else is [`TransportError::Truncated`].
    pub async fn read_frame(
        &mut self,
    ) -> Result<Option<Vec<u8>>, TransportError> {
        let mut header = [0u8; HEADER_LEN];

        // Read the first header byte on its own so a clean close can be
        // told apart from a close in the middle of a header.
        let n = self
            .inner
            .read(&mut header[..1])
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Ok(None);
        }
        self.inner
            .read_exact(&mut header[1..])
            .await
            .map_err(map_read_err)?;

        let len = u32::from_be_bytes(header) as usize;
        self.config.check_len(len)?;

        let mut body = vec![0u8; len];
        self.inner
            .read_exact(&mut body)
            .await
            .map_err(map_read_err)?;

        tracing::trace!(len, "frame received");
        Ok(Some(body))
    }

    /// Returns the underlying stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn map_read_err(e: std::io::Error) -> TransportError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        TransportError::Truncated
    } else {
        TransportError::ReceiveFailed(e)
    }
}

// ---------------------------------------------------------------------------
// FrameWriter
// ---------------------------------------------------------------------------

/// Writes whole frames to a byte stream.
pub struct FrameWriter<W> {
    inner: W,
    config: FrameConfig,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Writes one frame and flushes it.
    ///
    /// The same limits as the reader apply, so a peer using the same
    /// config never receives a frame it would reject.
    pub async fn write_frame(
        &mut self,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        self.config.check_len(payload.len())?;

        let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);

        self.inner
            .write_all(&buf)
            .await
            .map_err(TransportError::SendFailed)?;
        self.inner
            .flush()
            .await
            .map_err(TransportError::SendFailed)?;

        tracing::trace!(len = payload.len(), "frame sent");
        Ok(())
    }

    /// Shuts down the write side of the stream.
    pub async fn shutdown(&mut self) -> Result<(), TransportError> {
        self.inner
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}
