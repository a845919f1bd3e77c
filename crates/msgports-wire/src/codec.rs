use bytes::{Buf, BufMut, BytesMut};
use msgports_sender::ResolvedMessage;

use crate::error::{Result, WireError};

/// Frame header: magic (2) + version (1) + reserved (1) + length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "MP" (0x4d 0x50).
pub const MAGIC: [u8; 2] = [0x4d, 0x50];

/// Current frame format version.
pub const WIRE_VERSION: u8 = 1;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Encode a resolved message into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬─────────┬──────────┬───────────┬──────────────────┐
/// │ Magic (2B) │ Version │ Reserved │ Length    │ Payload (JSON)   │
/// │ 0x4d 0x50  │ (1B)    │ (1B, 0)  │ (4B LE)   │ (Length bytes)   │
/// └────────────┴─────────┴──────────┴───────────┴──────────────────┘
/// ```
pub fn encode_message(
    message: &ResolvedMessage,
    max_payload: usize,
    dst: &mut BytesMut,
) -> Result<()> {
    let payload = serde_json::to_vec(message)?;
    let limit = max_payload.min(u32::MAX as usize);
    if payload.len() > limit {
        return Err(WireError::PayloadTooLarge {
            size: payload.len(),
            max: limit,
        });
    }

    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u8(WIRE_VERSION);
    dst.put_u8(0);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(&payload);
    Ok(())
}

/// Decode one message from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_message(
    src: &mut BytesMut,
    max_payload: usize,
) -> Result<Option<ResolvedMessage>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(WireError::InvalidMagic);
    }
    if src[2] != WIRE_VERSION {
        return Err(WireError::UnsupportedVersion(src[2]));
    }

    let payload_len = u32::from_le_bytes([src[4], src[5], src[6], src[7]]) as usize;
    if payload_len > max_payload {
        return Err(WireError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    let message = serde_json::from_slice(&payload)?;
    Ok(Some(message))
}

/// Configuration for wire encoding and decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}
