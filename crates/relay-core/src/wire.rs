//! Relay wire format: the framing every packet travels in.
//!
//! These types ARE the protocol. Every field, every size, every reserved byte
//! is part of the wire format, and message type tags are append-only.
//!
//! ```text
//! [4 bytes: total_length, big-endian]
//! [4 bytes: magic = 0xDEADBEEF, big-endian]
//! [1 byte : message type tag]
//! [3 bytes: reserved, zero]
//! [4 bytes: payload_length, big-endian]
//! [payload_length bytes: JSON payload]
//! ```
//!
//! `total_length` counts the header and payload, never the prefix itself.
//! The header is a zerocopy struct with network-endian fields, so encoding
//! and decoding never touch raw offsets.

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::byteorder::{NetworkEndian, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Constants ─────────────────────────────────────────────────────────────────

/// Sentinel validating a frame before any other header field is trusted.
pub const MAGIC: u32 = 0xDEAD_BEEF;

/// Magic(4) + Type(1) + Reserved(3) + PayloadLength(4).
pub const HEADER_SIZE: usize = 12;

/// Size of the big-endian total-length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Upper bound on `total_length`. A peer announcing more is kicked.
pub const MAX_PACKET_SIZE: usize = 1024 * 1024;

// ── Frame Header ──────────────────────────────────────────────────────────────

/// Fixed header following the length prefix.
///
/// Wire size: 12 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    /// Always [`MAGIC`]. Anything else rejects the frame.
    pub magic: U32<NetworkEndian>,

    /// Raw [`MessageType`] tag.
    pub type_tag: u8,

    /// Written as zero, ignored on read.
    pub reserved: [u8; 3],

    /// Number of payload bytes following the header.
    pub payload_len: U32<NetworkEndian>,
}

assert_eq_size!(FrameHeader, [u8; HEADER_SIZE]);

impl FrameHeader {
    pub fn new(msg_type: MessageType, payload_len: u32) -> Self {
        Self {
            magic: U32::new(MAGIC),
            type_tag: msg_type.tag(),
            reserved: [0; 3],
            payload_len: U32::new(payload_len),
        }
    }
}

// ── Message Types ─────────────────────────────────────────────────────────────

/// Message type carried in the header's tag byte.
///
/// Requests live in 0x01.., responses in 0x11.., indications in 0x21...
/// New types are appended to their band, never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Undefined,

    GetTimeRequest,
    GetNameRequest,
    GetClientListRequest,
    SendMessageRequest,
    SendFileRequest,
    DisconnectRequest,

    GetTimeResponse,
    GetNameResponse,
    GetClientListResponse,
    SendMessageResponse,
    SendFileResponse,

    MessageIndication,
    ServerShutdownIndication,
    SystemNoticeIndication,
    FileIndication,

    /// A tag this build does not know. Passed through untouched.
    Other(u8),
}

impl MessageType {
    /// Map a wire tag to a type. Total: unknown tags become `Other`.
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0x00 => Self::Undefined,
            0x01 => Self::GetTimeRequest,
            0x02 => Self::GetNameRequest,
            0x03 => Self::GetClientListRequest,
            0x04 => Self::SendMessageRequest,
            0x05 => Self::SendFileRequest,
            0x06 => Self::DisconnectRequest,
            0x11 => Self::GetTimeResponse,
            0x12 => Self::GetNameResponse,
            0x13 => Self::GetClientListResponse,
            0x14 => Self::SendMessageResponse,
            0x15 => Self::SendFileResponse,
            0x21 => Self::MessageIndication,
            0x22 => Self::ServerShutdownIndication,
            0x23 => Self::SystemNoticeIndication,
            0x24 => Self::FileIndication,
            other => Self::Other(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Undefined => 0x00,
            Self::GetTimeRequest => 0x01,
            Self::GetNameRequest => 0x02,
            Self::GetClientListRequest => 0x03,
            Self::SendMessageRequest => 0x04,
            Self::SendFileRequest => 0x05,
            Self::DisconnectRequest => 0x06,
            Self::GetTimeResponse => 0x11,
            Self::GetNameResponse => 0x12,
            Self::GetClientListResponse => 0x13,
            Self::SendMessageResponse => 0x14,
            Self::SendFileResponse => 0x15,
            Self::MessageIndication => 0x21,
            Self::ServerShutdownIndication => 0x22,
            Self::SystemNoticeIndication => 0x23,
            Self::FileIndication => 0x24,
            Self::Other(tag) => tag,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::GetTimeRequest => "GET_TIME_REQUEST",
            Self::GetNameRequest => "GET_NAME_REQUEST",
            Self::GetClientListRequest => "GET_CLIENT_LIST_REQUEST",
            Self::SendMessageRequest => "SEND_MESSAGE_REQUEST",
            Self::SendFileRequest => "SEND_FILE_REQUEST",
            Self::DisconnectRequest => "DISCONNECT_REQUEST",
            Self::GetTimeResponse => "GET_TIME_RESPONSE",
            Self::GetNameResponse => "GET_NAME_RESPONSE",
            Self::GetClientListResponse => "GET_CLIENT_LIST_RESPONSE",
            Self::SendMessageResponse => "SEND_MESSAGE_RESPONSE",
            Self::SendFileResponse => "SEND_FILE_RESPONSE",
            Self::MessageIndication => "MESSAGE_INDICATION",
            Self::ServerShutdownIndication => "SERVER_SHUTDOWN_INDICATION",
            Self::SystemNoticeIndication => "SYSTEM_NOTICE_INDICATION",
            Self::FileIndication => "FILE_INDICATION",
            Self::Other(_) => "UNKNOWN_TYPE",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(tag) => write!(f, "UNKNOWN_TYPE(0x{tag:02x})"),
            known => f.write_str(known.name()),
        }
    }
}

// ── Packet ────────────────────────────────────────────────────────────────────

/// In-memory (type, content) pair before framing / after unframing.
///
/// Content is either a complete JSON document or empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub msg_type: MessageType,
    pub content: Bytes,
}

impl Packet {
    pub fn new(msg_type: MessageType, content: impl Into<Bytes>) -> Self {
        Self {
            msg_type,
            content: content.into(),
        }
    }

    /// A packet with no payload (queries and the disconnect directive).
    pub fn empty(msg_type: MessageType) -> Self {
        Self::new(msg_type, Bytes::new())
    }

    /// Serialize `value` as the payload.
    ///
    /// Payload structs serialize infallibly; if one ever fails the packet is
    /// sent empty rather than half-written.
    pub fn json<T: serde::Serialize>(msg_type: MessageType, value: &T) -> Self {
        let content = serde_json::to_vec(value).unwrap_or_default();
        Self::new(msg_type, content)
    }

    /// Parse the payload as `T`.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.content)
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// Frame a packet: length prefix, header, payload.
pub fn encode(packet: &Packet) -> Vec<u8> {
    let payload_len = packet.content.len();
    let total_len = HEADER_SIZE + payload_len;
    let header = FrameHeader::new(packet.msg_type, payload_len as u32);

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + total_len);
    frame.extend_from_slice(&(total_len as u32).to_be_bytes());
    frame.extend_from_slice(header.as_bytes());
    frame.extend_from_slice(&packet.content);
    frame
}

/// Decode exactly `total_length` bytes (header + payload, no prefix).
pub fn decode(frame: &[u8]) -> Result<Packet, WireError> {
    let header = FrameHeader::read_from_prefix(frame).ok_or(WireError::Truncated {
        expected: HEADER_SIZE,
        actual: frame.len(),
    })?;

    let magic = header.magic.get();
    if magic != MAGIC {
        return Err(WireError::BadMagic(magic));
    }

    let payload = &frame[HEADER_SIZE..];
    let payload_len = header.payload_len.get() as usize;
    if payload_len > payload.len() {
        return Err(WireError::Truncated {
            expected: HEADER_SIZE + payload_len,
            actual: frame.len(),
        });
    }
    if payload_len < payload.len() {
        return Err(WireError::LengthMismatch {
            declared: payload_len,
            available: payload.len(),
        });
    }

    Ok(Packet {
        msg_type: MessageType::from_tag(header.type_tag),
        content: Bytes::copy_from_slice(payload),
    })
}

/// Check that `packet` frames within [`MAX_PACKET_SIZE`].
pub fn check_packet(packet: &Packet) -> Result<(), WireError> {
    check_total_len(HEADER_SIZE + packet.content.len())
}

/// Check a length prefix against `[HEADER_SIZE, MAX_PACKET_SIZE]`.
pub fn check_total_len(total_len: usize) -> Result<(), WireError> {
    if (HEADER_SIZE..=MAX_PACKET_SIZE).contains(&total_len) {
        Ok(())
    } else {
        Err(WireError::SizeViolation(total_len))
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when reading or interpreting frames.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Peer closed the connection, or the read failed. Ends the session quietly.
    #[error("connection closed")]
    ConnectionClosed(#[source] Option<std::io::Error>),

    #[error("bad magic: 0x{0:08x}")]
    BadMagic(u32),

    #[error("packet size {0} outside [{}, {}]", HEADER_SIZE, MAX_PACKET_SIZE)]
    SizeViolation(usize),

    #[error("frame truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("payload length {declared} disagrees with {available} bytes available")]
    LengthMismatch { declared: usize, available: usize },
}

impl WireError {
    /// True for everything except a plain disconnect.
    pub fn is_protocol_violation(&self) -> bool {
        !matches!(self, WireError::ConnectionClosed(_))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
