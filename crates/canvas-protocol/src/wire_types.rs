//! Low-level wire types and constants.
//!
//! This module defines:
//! - WebSocket opcodes.
//! - The handshake GUID.
//! - Size constants for frame headers and pixel records.
//!
//! The actual encode/decode logic lives in `frame`, `handshake` and
//! `binary_codec`.

/// GUID appended to `Sec-WebSocket-Key` before hashing.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub const FIN_BIT: u8 = 0x80;

/// Byte 0: RSV1..RSV3. No extensions are negotiated, so these must be zero.
pub const RSV_BITS: u8 = 0x70;

pub const OPCODE_MASK: u8 = 0x0F;

pub const MASK_BIT: u8 = 0x80;

pub const BASE_LEN_MASK: u8 = 0x7F;

/// Base length escape for a 16-bit extended length.
pub const LEN_16_ESCAPE: u8 = 126;

/// Base length escape for a 64-bit extended length.
pub const LEN_64_ESCAPE: u8 = 127;

/// Largest payload that fits the 7-bit base length.
pub const MAX_SHORT_LEN: usize = 125;

pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// One pixel record: x (u16 LE), y (u16 LE), color (u8).
pub const PIXEL_RECORD_LEN: usize = 5;

/// Close status sent when we acknowledge a client's close.
pub const CLOSE_NORMAL: u16 = 1000;

/// Frame types (RFC 6455 section 5.2).
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Opcode {
    Continuation = 0x0,

    Text = 0x1,

    /// Binary message (pixel records).
    Binary = 0x2,

    Close = 0x8,

    /// Ping; answered with a pong carrying the same payload.
    Ping = 0x9,

    Pong = 0xA,
}

impl Opcode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

/// Close payload: 2-byte big-endian status code.
pub fn close_payload(code: u16) -> [u8; 2] {
    code.to_be_bytes()
}
