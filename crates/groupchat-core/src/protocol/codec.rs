//! Binary codec for group protocol frames.
//!
//! Wire format:
//! ```text
//! header:  [version:1][msg_type:1][reserved:2][payload_len:4][seq:8]
//! payload: [cluster:str16][sender_uuid:16][sender_name:str16][body]
//! body (Data only): [kind:1][len:4][bytes:len]
//! ```
//! `str16` is a 2-byte big-endian length followed by UTF-8 bytes.  All
//! multi-byte integers are big-endian.

use thiserror::Error;
use uuid::Uuid;

use crate::domain::view::MemberId;
use crate::protocol::messages::{
    Frame, GroupMessage, MessageType, Payload, PayloadKind, HEADER_SIZE, MAX_FRAME_SIZE,
    PROTOCOL_VERSION,
};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The header's payload length does not match the datagram.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// A string field does not fit its 2-byte length prefix.
    #[error("{field} is {len} bytes, limit is {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// The encoded frame would not fit in one UDP datagram.
    #[error("frame of {size} bytes exceeds the {max}-byte datagram limit")]
    FrameTooLarge { size: usize, max: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`Frame`] into a datagram.
///
/// # Errors
///
/// Returns [`ProtocolError::FieldTooLong`] for oversize names and
/// [`ProtocolError::FrameTooLarge`] when the result exceeds
/// [`MAX_FRAME_SIZE`].
///
/// # Examples
///
/// ```rust
/// use groupchat_core::domain::view::MemberId;
/// use groupchat_core::protocol::{decode_frame, encode_frame, Frame, GroupMessage};
///
/// let frame = Frame {
///     cluster: "chat".into(),
///     sender: MemberId::new("alice"),
///     seq: 7,
///     message: GroupMessage::Join,
/// };
/// let bytes = encode_frame(&frame).unwrap();
/// assert_eq!(decode_frame(&bytes).unwrap(), frame);
/// ```
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = Vec::with_capacity(64);
    write_str16(&mut payload, "cluster", &frame.cluster)?;
    payload.extend_from_slice(frame.sender.uuid.as_bytes());
    write_str16(&mut payload, "sender name", &frame.sender.name)?;
    if let GroupMessage::Data(body) = &frame.message {
        encode_payload(&mut payload, body);
    }

    let size = HEADER_SIZE + payload.len();
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = Vec::with_capacity(size);
    buf.push(PROTOCOL_VERSION);
    buf.push(frame.message.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&frame.seq.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decodes one datagram into a [`Frame`].
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<Frame, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let type_byte = bytes[1];
    let msg_type =
        MessageType::try_from(type_byte).map_err(|_| ProtocolError::UnknownMessageType(type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = read_u32(bytes, 4)? as usize;
    let seq = read_u64(bytes, 8)?;

    let available = bytes.len() - HEADER_SIZE;
    if available != payload_len {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available,
        });
    }
    let payload = &bytes[HEADER_SIZE..];

    let (cluster, offset) = read_str16(payload, 0)?;
    let uuid = read_uuid(payload, offset)?;
    let (name, offset) = read_str16(payload, offset + 16)?;

    let message = match msg_type {
        MessageType::Join => GroupMessage::Join,
        MessageType::Present => GroupMessage::Present,
        MessageType::Leave => GroupMessage::Leave,
        MessageType::Data => GroupMessage::Data(decode_payload(payload, offset)?),
    };

    Ok(Frame {
        cluster,
        sender: MemberId { uuid, name },
        seq,
        message,
    })
}

// ── Payload body ──────────────────────────────────────────────────────────────

fn encode_payload(buf: &mut Vec<u8>, body: &Payload) {
    let bytes: &[u8] = match body {
        Payload::Text(text) => text.as_bytes(),
        Payload::Binary(data) => data,
    };
    buf.push(body.kind() as u8);
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn decode_payload(buf: &[u8], offset: usize) -> Result<Payload, ProtocolError> {
    require_len(buf, offset + 5, "Data")?;
    let kind_byte = buf[offset];
    let kind = PayloadKind::try_from(kind_byte).map_err(|_| {
        ProtocolError::MalformedPayload(format!("unknown payload kind: 0x{kind_byte:02X}"))
    })?;
    let len = read_u32(buf, offset + 1)? as usize;
    let start = offset + 5;
    require_len(buf, start + len, "Data body")?;
    let body = &buf[start..start + len];

    match kind {
        PayloadKind::Text => std::str::from_utf8(body)
            .map(|s| Payload::Text(s.to_string()))
            .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8 text: {e}"))),
        PayloadKind::Binary => Ok(Payload::Binary(body.to_vec())),
    }
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    let bytes: [u8; 4] = buf
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .ok_or(ProtocolError::InsufficientData {
            needed: offset + 4,
            available: buf.len(),
        })?;
    Ok(u32::from_be_bytes(bytes))
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    let bytes: [u8; 8] = buf
        .get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .ok_or(ProtocolError::InsufficientData {
            needed: offset + 8,
            available: buf.len(),
        })?;
    Ok(u64::from_be_bytes(bytes))
}

fn read_uuid(buf: &[u8], offset: usize) -> Result<Uuid, ProtocolError> {
    let bytes: [u8; 16] = buf
        .get(offset..offset + 16)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            ProtocolError::MalformedPayload(format!(
                "need 16 bytes for UUID at offset {offset}, got {}",
                buf.len().saturating_sub(offset)
            ))
        })?;
    Ok(Uuid::from_bytes(bytes))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_str16(buf: &mut Vec<u8>, field: &'static str, s: &str) -> Result<(), ProtocolError> {
    let bytes = s.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len: bytes.len(),
        max: u16::MAX as usize,
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_str16(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
