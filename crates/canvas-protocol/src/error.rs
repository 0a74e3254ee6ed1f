//! Error types for the wire layer.
//!
//! Both enums describe terminal failures: the connection that produced
//! the bytes is closed. Validation problems inside an otherwise
//! well-formed message (bad coordinates, unknown opcodes) are not
//! errors at this layer.

use thiserror::Error;

/// Malformed framing or message sequencing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// RSV bits set without a negotiated extension.
    #[error("reserved bits set in frame header: {0:#04x}")]
    ReservedBits(u8),

    /// 64-bit length with the most significant bit set.
    #[error("invalid 64-bit payload length {0:#x}")]
    InvalidLength(u64),

    /// Payload length not addressable on this platform.
    #[error("frame payload of {0} bytes is too large")]
    FrameTooLarge(u64),

    #[error("invalid control frame (opcode {opcode:#x}, fin {fin}, {len} bytes)")]
    InvalidControlFrame { opcode: u8, fin: bool, len: u64 },

    #[error("continuation frame without a message in progress")]
    UnexpectedContinuation,

    #[error("data frame interleaved with an unfinished fragmented message")]
    InterleavedMessage,

    #[error("message of {len} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { len: usize, limit: usize },

    #[error("buffer truncated")]
    Truncated,

    #[error("snapshot payload has {actual} pixels, expected {expected}")]
    SnapshotSize { expected: usize, actual: usize },
}

/// Rejected upgrade request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// No `\r\n\r\n` within the allowed header size.
    #[error("request header exceeds {limit} bytes")]
    HeaderTooLarge { limit: usize },

    #[error("request header is not valid UTF-8")]
    InvalidUtf8,

    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("malformed header line")]
    MalformedHeader,

    #[error("more than {limit} headers")]
    TooManyHeaders { limit: usize },

    #[error("websocket upgrade requires GET, got {0}")]
    NotGet(String),

    /// `Upgrade: websocket` present but no usable `Sec-WebSocket-Key`.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,
}
