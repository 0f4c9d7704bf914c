//! Length-prefixed framing for [`Envelope`](crate::Envelope)s.
//!
//! The wire format is a 4-byte big-endian length prefix followed by an
//! opaque payload: `encode` and `decode` are symmetric, so the relay never
//! needs to interpret payload bytes, only the prefix and the envelope
//! header fields once decoded.
//!
//! This module does no I/O — [`try_decode_frame`] is a pure function over an
//! already-buffered byte slice so transport adapters (which own the actual
//! socket/pipe reads) can drive it incrementally, the same way the teacher's
//! `UpstreamReader` incrementally parses MCP frames off an `AsyncRead`.

use crate::envelope::Envelope;
use crate::error::DistioError;

const LENGTH_PREFIX_BYTES: usize = 4;

/// Encode an envelope as bytes: JSON payload, no length prefix.
///
/// Used when a transport already knows the message boundary (e.g. an
/// in-process channel). Transports that multiplex a byte stream should use
/// [`encode_frame`] instead.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, DistioError> {
    serde_json::to_vec(envelope)
        .map_err(|e| DistioError::transport_with_source("failed to encode envelope", e))
}

/// Decode bytes produced by [`encode_envelope`] back into an envelope.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, DistioError> {
    serde_json::from_slice(bytes)
        .map_err(|e| DistioError::transport_with_source("failed to decode envelope", e))
}

/// Encode an envelope as one length-prefixed wire frame:
/// `[u32 big-endian length][json payload]`.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, DistioError> {
    let body = encode_envelope(envelope)?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_BYTES + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Outcome of attempting to parse one frame out of a buffer.
pub enum FrameDecode {
    /// Not enough bytes buffered yet for even the length prefix, or for the
    /// body the prefix announced. Caller should read more and retry.
    Incomplete,
    /// A complete frame was present but its payload did not decode to a
    /// well-formed envelope. Per the wire contract this is dropped with a
    /// warning rather than tearing down the transport; `consumed` bytes
    /// should still be removed from the buffer so the stream can resync on
    /// the next frame.
    Malformed { consumed: usize },
    /// A complete, well-formed envelope. `consumed` bytes (prefix + body)
    /// should be removed from the buffer.
    Ready {
        envelope: Box<Envelope>,
        consumed: usize,
    },
}

/// Attempt to parse one length-prefixed frame from the front of `buf`.
///
/// Pure and side-effect free: does not mutate `buf`. Callers own advancing
/// their read buffer by `consumed` bytes when the result is not
/// [`FrameDecode::Incomplete`].
pub fn try_decode_frame(buf: &[u8]) -> FrameDecode {
    if buf.len() < LENGTH_PREFIX_BYTES {
        return FrameDecode::Incomplete;
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    let total = LENGTH_PREFIX_BYTES + len;
    if buf.len() < total {
        return FrameDecode::Incomplete;
    }
    let body = &buf[LENGTH_PREFIX_BYTES..total];
    match decode_envelope(body) {
        Ok(envelope) => FrameDecode::Ready {
            envelope: Box::new(envelope),
            consumed: total,
        },
        Err(_) => FrameDecode::Malformed { consumed: total },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;

    #[test]
    fn encode_then_decode_is_identity() {
        let original = Envelope::request(7, "echo", serde_json::json!("hello"), 1);
        let bytes = encode_envelope(&original).unwrap();
        let decoded = decode_envelope(&bytes).unwrap();
        assert_eq!(decoded.request_id, original.request_id);
        assert_eq!(decoded.task_name, original.task_name);
        assert_eq!(decoded.payload, original.payload);
    }

    #[test]
    fn frame_round_trips_through_try_decode() {
        let original = Envelope::response(3, "echo", serde_json::json!({"v": 1}), 2);
        let frame = encode_frame(&original).unwrap();
        match try_decode_frame(&frame) {
            FrameDecode::Ready { envelope, consumed } => {
                assert_eq!(consumed, frame.len());
                assert_eq!(envelope.request_id, 3);
            }
            _ => panic!("expected Ready"),
        }
    }

    #[test]
    fn incomplete_frame_requests_more_bytes() {
        let original = Envelope::request(1, "echo", serde_json::json!(null), 0);
        let frame = encode_frame(&original).unwrap();
        assert!(matches!(
            try_decode_frame(&frame[..frame.len() - 1]),
            FrameDecode::Incomplete
        ));
        assert!(matches!(try_decode_frame(&frame[..2]), FrameDecode::Incomplete));
    }

    #[test]
    fn malformed_body_is_dropped_not_fatal() {
        let mut frame = Vec::new();
        let garbage = b"not json";
        frame.extend_from_slice(&(garbage.len() as u32).to_be_bytes());
        frame.extend_from_slice(garbage);
        match try_decode_frame(&frame) {
            FrameDecode::Malformed { consumed } => assert_eq!(consumed, frame.len()),
            _ => panic!("expected Malformed"),
        }
    }

    #[test]
    fn two_frames_back_to_back_parse_independently() {
        let a = encode_frame(&Envelope::request(1, "a", serde_json::json!(1), 0)).unwrap();
        let b = encode_frame(&Envelope::request(2, "b", serde_json::json!(2), 0)).unwrap();
        let mut buf = a.clone();
        buf.extend_from_slice(&b);

        let (first_consumed, first_id) = match try_decode_frame(&buf) {
            FrameDecode::Ready { envelope, consumed } => (consumed, envelope.request_id),
            _ => panic!("expected Ready"),
        };
        assert_eq!(first_consumed, a.len());
        assert_eq!(first_id, 1);

        let rest = &buf[first_consumed..];
        match try_decode_frame(rest) {
            FrameDecode::Ready { envelope, consumed } => {
                assert_eq!(consumed, b.len());
                assert_eq!(envelope.request_id, 2);
            }
            _ => panic!("expected Ready"),
        }
    }
}
