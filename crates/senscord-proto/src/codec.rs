//! Length-prefixed bincode framing: a `u32` little-endian byte count
//! followed by the bincode-encoded [`crate::message::Message`].
//!
//! Grounded on the length-delimited framing idiom used across the pack's
//! TCP-based protocol crates; `bincode` itself is the wire format chosen for
//! binary sensor frames (see DESIGN.md).

use crate::message::Message;

/// Maximum encoded message size accepted by [`decode_frame`]. Chosen well
/// above any single frame batch while still bounding a malicious or
/// corrupted length prefix.
pub const MAX_FRAME_BYTES: u32 = 256 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("bincode encode error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    FrameTooLarge(u32),
    #[error("frame prefix truncated: need 4 bytes, got {0}")]
    TruncatedPrefix(usize),
}

/// Encode `message` as `[len: u32 LE][bincode body]`.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serialize(message)?;
    let len: u32 = body
        .len()
        .try_into()
        .map_err(|_| CodecError::FrameTooLarge(u32::MAX))?;
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(len));
    }
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Read the 4-byte length prefix out of `buf`, returning `(body_len, None)`
/// semantics are delegated to the transport layer, which owns the socket
/// read loop; this just validates a prefix already read into memory.
pub fn read_prefix(buf: &[u8]) -> Result<u32, CodecError> {
    if buf.len() < 4 {
        return Err(CodecError::TruncatedPrefix(buf.len()));
    }
    let len = u32::from_le_bytes(buf[0..4].try_into().expect("checked length"));
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(len));
    }
    Ok(len)
}

/// Decode a complete frame body (the bytes after the length prefix).
pub fn decode_body(body: &[u8]) -> Result<Message, CodecError> {
    Ok(bincode::deserialize(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{DataType, Header, MessageType};
    use crate::message::{Payload, StandardRequest};

    fn sample_message() -> Message {
        Message::new(
            Header::new(1, 2, MessageType::Request, DataType::GetVersion),
            Payload::StandardRequest(StandardRequest),
        )
    }

    #[test]
    fn round_trips_through_encode_and_decode() {
        let message = sample_message();
        let framed = encode_frame(&message).unwrap();
        let len = read_prefix(&framed[0..4]).unwrap();
        let body = &framed[4..4 + len as usize];
        let decoded = decode_body(body).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn truncated_prefix_is_rejected() {
        assert!(matches!(
            read_prefix(&[1, 2, 3]),
            Err(CodecError::TruncatedPrefix(3))
        ));
    }

    #[test]
    fn oversized_prefix_is_rejected() {
        let huge = (MAX_FRAME_BYTES + 1).to_le_bytes();
        assert!(matches!(
            read_prefix(&huge),
            Err(CodecError::FrameTooLarge(_))
        ));
    }
}
