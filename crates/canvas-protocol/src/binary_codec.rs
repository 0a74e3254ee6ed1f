//! Binary payload formats.
//!
//! Pixel updates (client -> server, binary frames):
//!
//! ```text
//! +--------+--------+--------+--------+-------+
//! | x lo   | x hi   | y lo   | y hi   | color |   repeated
//! +--------+--------+--------+--------+-------+
//! ```
//!
//! Initial snapshot (server -> client, one binary frame):
//!
//! ```text
//! [width u16 LE][height u16 LE][width * height color bytes, row-major]
//! ```

use canvas_core::{CanvasSnapshot, PixelUpdate};

use crate::error::ProtocolError;
use crate::wire_types::PIXEL_RECORD_LEN;

/// Width + height prefix of the snapshot payload.
pub const SNAPSHOT_HEADER_LEN: usize = 4;

// ----------------------------------------------------------------------------
// Pixel records
// ----------------------------------------------------------------------------

/// Decode every complete record. A trailing partial record is dropped.
pub fn decode_pixel_updates(payload: &[u8]) -> Vec<PixelUpdate> {
    payload
        .chunks_exact(PIXEL_RECORD_LEN)
        .map(|rec| {
            PixelUpdate::new(
                u16::from_le_bytes([rec[0], rec[1]]),
                u16::from_le_bytes([rec[2], rec[3]]),
                rec[4],
            )
        })
        .collect()
}

pub fn encode_pixel_updates(updates: &[PixelUpdate], out: &mut Vec<u8>) {
    out.reserve(updates.len() * PIXEL_RECORD_LEN);
    for u in updates {
        out.extend_from_slice(&u.x.to_le_bytes());
        out.extend_from_slice(&u.y.to_le_bytes());
        out.push(u.color);
    }
}

// ----------------------------------------------------------------------------
// Snapshot
// ----------------------------------------------------------------------------

pub fn encode_snapshot(snapshot: &CanvasSnapshot) -> Vec<u8> {
    let mut out = Vec::with_capacity(SNAPSHOT_HEADER_LEN + snapshot.pixels.len());
    out.extend_from_slice(&snapshot.width.to_le_bytes());
    out.extend_from_slice(&snapshot.height.to_le_bytes());
    out.extend_from_slice(&snapshot.pixels);
    out
}

pub fn decode_snapshot(payload: &[u8]) -> Result<CanvasSnapshot, ProtocolError> {
    if payload.len() < SNAPSHOT_HEADER_LEN {
        return Err(ProtocolError::Truncated);
    }

    let width = u16::from_le_bytes([payload[0], payload[1]]);
    let height = u16::from_le_bytes([payload[2], payload[3]]);
    let pixels = &payload[SNAPSHOT_HEADER_LEN..];

    let expected = width as usize * height as usize;
    if pixels.len() != expected {
        return Err(ProtocolError::SnapshotSize {
            expected,
            actual: pixels.len(),
        });
    }

    Ok(CanvasSnapshot {
        width,
        height,
        pixels: pixels.to_vec(),
    })
}
