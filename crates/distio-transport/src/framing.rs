//! Raw, type-agnostic length-prefixed framing over an `AsyncRead`/`AsyncWrite`
//! byte stream.
//!
//! This is the byte-level half of the wire frame described in the codec
//! contract: a 4-byte big-endian length prefix followed by an opaque body.
//! [`distio_core::codec`] owns interpreting that body as an [`Envelope`];
//! this module only owns getting the bytes on and off the wire, the same
//! split the teacher draws between `framing.rs` (byte framing) and
//! `transport.rs`/`proxy.rs` (message semantics).

use distio_core::DistioError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const LENGTH_PREFIX_BYTES: usize = 4;

/// Reads length-prefixed frames off an `AsyncRead`, one `read_exact` call for
/// the prefix and one for the body per frame.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next frame body, or `None` on clean EOF at a frame boundary.
    ///
    /// # Errors
    ///
    /// Returns [`DistioError::TransportError`] on I/O failure or EOF in the
    /// middle of a frame.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, DistioError> {
        let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
        match self.inner.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(DistioError::transport_with_source("frame read failed", e)),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut body = vec![0u8; len];
        self.inner
            .read_exact(&mut body)
            .await
            .map_err(|e| DistioError::transport_with_source("frame body read failed", e))?;
        Ok(Some(body))
    }
}

/// Write one length-prefixed frame and flush.
///
/// # Errors
///
/// Returns [`DistioError::TransportError`] on I/O failure.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<(), DistioError> {
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_BYTES + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(body);
    writer
        .write_all(&frame)
        .await
        .map_err(|e| DistioError::transport_with_source("frame write failed", e))?;
    writer
        .flush()
        .await
        .map_err(|e| DistioError::transport_with_source("frame flush failed", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"hello").await.unwrap();
        let mut reader = FrameReader::new(&buf[..]);
        let body = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(body, b"hello");
    }

    #[tokio::test]
    async fn clean_eof_at_boundary_returns_none() {
        let mut reader = FrameReader::new(&b""[..]);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_body_is_transport_error() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(b"short");
        let mut reader = FrameReader::new(&buf[..]);
        assert!(reader.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn two_frames_read_independently() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"one").await.unwrap();
        write_frame(&mut buf, b"two").await.unwrap();
        let mut reader = FrameReader::new(&buf[..]);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"one");
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"two");
    }
}
