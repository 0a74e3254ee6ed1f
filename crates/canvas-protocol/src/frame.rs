//! WebSocket frame encoding/decoding.
//!
//! ```text
//!  byte 0          byte 1          [2 or 8 bytes]     [4 bytes]    N bytes
//! +-+---+-------+ +-+-------------+ +---------------+ +----------+ +---------+
//! |F|RSV|opcode | |M| base length | | extended len  | | mask key | | payload |
//! +-+---+-------+ +-+-------------+ +---------------+ +----------+ +---------+
//! ```
//!
//! - base length 0..=125 is the payload length,
//! - 126 means the next 2 bytes (BE) hold it,
//! - 127 means the next 8 bytes (BE) hold it.
//!
//! Decoding is restartable: reads land at arbitrary byte boundaries, so
//! `decode_frame` never consumes anything until a whole frame is present.
//! The caller keeps the unconsumed bytes and appends the next read.

use bytes::Bytes;

use crate::error::ProtocolError;
use crate::wire_types::{
    Opcode, BASE_LEN_MASK, FIN_BIT, LEN_16_ESCAPE, LEN_64_ESCAPE, MASK_BIT, MAX_CONTROL_PAYLOAD,
    MAX_SHORT_LEN, OPCODE_MASK, RSV_BITS,
};

/// A decoded frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    /// Raw opcode nibble; unknown values are kept so the caller can skip them.
    pub opcode: u8,
    pub masked: bool,
    pub payload: Bytes,
}

impl Frame {
    /// Known opcode, or `None` for reserved values.
    pub fn kind(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }
}

/// Result of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// Not enough bytes yet. `needed` is a lower bound on how many more
    /// bytes must arrive (exact once the length field is readable).
    Incomplete { needed: usize },

    /// One frame, and how many bytes of the buffer it occupied.
    Complete { frame: Frame, consumed: usize },
}

/// Try to decode one frame from the front of `buf`.
///
/// On `Incomplete` nothing has been consumed.
pub fn decode_frame(buf: &[u8]) -> Result<Decoded, ProtocolError> {
    if buf.len() < 2 {
        return Ok(Decoded::Incomplete {
            needed: 2 - buf.len(),
        });
    }

    let b0 = buf[0];
    let b1 = buf[1];

    if b0 & RSV_BITS != 0 {
        return Err(ProtocolError::ReservedBits(b0 & RSV_BITS));
    }

    let fin = b0 & FIN_BIT != 0;
    let opcode = b0 & OPCODE_MASK;
    let masked = b1 & MASK_BIT != 0;
    let base_len = b1 & BASE_LEN_MASK;

    let ext_len = match base_len {
        LEN_16_ESCAPE => 2,
        LEN_64_ESCAPE => 8,
        _ => 0,
    };
    let mask_len = if masked { 4 } else { 0 };
    let header_len = 2 + ext_len + mask_len;

    if buf.len() < header_len {
        return Ok(Decoded::Incomplete {
            needed: header_len - buf.len(),
        });
    }

    let payload_len: u64 = match base_len {
        LEN_16_ESCAPE => u16::from_be_bytes([buf[2], buf[3]]) as u64,
        LEN_64_ESCAPE => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            let len = u64::from_be_bytes(raw);
            if len & (1 << 63) != 0 {
                return Err(ProtocolError::InvalidLength(len));
            }
            len
        }
        n => n as u64,
    };

    // Reserved opcodes are passed through for the caller to skip.
    let control = Opcode::from_u8(opcode).is_some_and(Opcode::is_control);
    if control && (!fin || payload_len > MAX_CONTROL_PAYLOAD as u64) {
        return Err(ProtocolError::InvalidControlFrame {
            opcode,
            fin,
            len: payload_len,
        });
    }

    let total = usize::try_from(payload_len)
        .ok()
        .and_then(|len| len.checked_add(header_len))
        .ok_or(ProtocolError::FrameTooLarge(payload_len))?;

    if buf.len() < total {
        return Ok(Decoded::Incomplete {
            needed: total - buf.len(),
        });
    }

    let mut payload = buf[header_len..total].to_vec();
    if masked {
        let key = [
            buf[header_len - 4],
            buf[header_len - 3],
            buf[header_len - 2],
            buf[header_len - 1],
        ];
        apply_mask(&mut payload, key);
    }

    Ok(Decoded::Complete {
        frame: Frame {
            fin,
            opcode,
            masked,
            payload: Bytes::from(payload),
        },
        consumed: total,
    })
}

/// XOR `bytes` with `key[i % 4]`. Applying it twice restores the input.
pub fn apply_mask(bytes: &mut [u8], key: [u8; 4]) {
    for (i, b) in bytes.iter_mut().enumerate() {
        *b ^= key[i % 4];
    }
}

/// Header size for a payload of `payload_len` bytes.
pub fn header_len(payload_len: usize, masked: bool) -> usize {
    let len_field = if payload_len <= MAX_SHORT_LEN {
        0
    } else if payload_len <= u16::MAX as usize {
        2
    } else {
        8
    };
    2 + len_field + if masked { 4 } else { 0 }
}

/// Encode a single unmasked server-to-client frame with FIN set.
///
/// The encoded bytes are appended to `out`.
pub fn encode_frame(opcode: Opcode, payload: &[u8], out: &mut Vec<u8>) {
    out.reserve(header_len(payload.len(), false) + payload.len());
    out.push(FIN_BIT | opcode as u8);
    push_length(out, 0, payload.len());
    out.extend_from_slice(payload);
}

/// Encode a masked client-to-server frame with FIN set.
///
/// Servers never mask; this exists for clients and tests.
pub fn encode_masked_frame(opcode: Opcode, payload: &[u8], key: [u8; 4], out: &mut Vec<u8>) {
    encode_masked_fragment(opcode, true, payload, key, out);
}

/// Encode one masked fragment; `opcode` is `Continuation` for all but
/// the first fragment of a message.
pub fn encode_masked_fragment(
    opcode: Opcode,
    fin: bool,
    payload: &[u8],
    key: [u8; 4],
    out: &mut Vec<u8>,
) {
    out.reserve(header_len(payload.len(), true) + payload.len());
    let fin_bit = if fin { FIN_BIT } else { 0 };
    out.push(fin_bit | opcode as u8);
    push_length(out, MASK_BIT, payload.len());
    out.extend_from_slice(&key);

    let start = out.len();
    out.extend_from_slice(payload);
    apply_mask(&mut out[start..], key);
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn push_length(out: &mut Vec<u8>, mask_bit: u8, len: usize) {
    if len <= MAX_SHORT_LEN {
        out.push(mask_bit | len as u8);
    } else if len <= u16::MAX as usize {
        out.push(mask_bit | LEN_16_ESCAPE);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | LEN_64_ESCAPE);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
}
