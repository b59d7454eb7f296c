//! Group protocol message types.
//!
//! Every datagram carries one [`Frame`]: the cluster it belongs to, the
//! member that sent it, a sequence number, and a [`GroupMessage`].

use crate::domain::view::MemberId;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size of the common frame header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Largest frame that fits in a single IPv4 UDP datagram.
pub const MAX_FRAME_SIZE: usize = 65_507;

// ── Message type codes ────────────────────────────────────────────────────────

/// Message type codes carried in byte 1 of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    // Presence (0x01–0x0F)
    Join = 0x01,
    Present = 0x02,
    Leave = 0x03,
    // Application data (0x10–0x1F)
    Data = 0x10,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::Join),
            0x02 => Ok(MessageType::Present),
            0x03 => Ok(MessageType::Leave),
            0x10 => Ok(MessageType::Data),
            _ => Err(()),
        }
    }
}

/// Kind byte that prefixes a [`Payload`] on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadKind {
    Text = 0x01,
    Binary = 0x02,
}

impl TryFrom<u8> for PayloadKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(PayloadKind::Text),
            0x02 => Ok(PayloadKind::Binary),
            _ => Err(()),
        }
    }
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Application payload of a `Data` message.
///
/// Only text is shown to the user.  Binary payloads exist so that other
/// senders can extend the protocol without breaking this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Wire kind of this payload.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Text(_) => PayloadKind::Text,
            Payload::Binary(_) => PayloadKind::Binary,
        }
    }

    /// Returns the text if this is a text payload.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Binary(_) => None,
        }
    }
}

/// The body of a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupMessage {
    /// The sender has just joined the cluster; existing members reply with
    /// `Present` so the joiner learns about them.
    Join,
    /// The sender is a member of the cluster.
    Present,
    /// The sender is leaving the cluster.
    Leave,
    /// Application data multicast to the whole cluster.
    Data(Payload),
}

impl GroupMessage {
    /// Returns the wire type code for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            GroupMessage::Join => MessageType::Join,
            GroupMessage::Present => MessageType::Present,
            GroupMessage::Leave => MessageType::Leave,
            GroupMessage::Data(_) => MessageType::Data,
        }
    }
}

/// One decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Cluster (group) name; frames for other clusters are ignored.
    pub cluster: String,
    /// Member that sent the frame.
    pub sender: MemberId,
    /// Sender-local sequence number.
    pub seq: u64,
    pub message: GroupMessage,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
