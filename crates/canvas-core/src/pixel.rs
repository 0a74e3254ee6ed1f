//! Pixel update messages.

use serde::{Deserialize, Serialize};

use crate::palette::ColorIndex;

/// A single cell mutation: paint `(x, y)` with `color`.
///
/// This is both what clients submit and what the server broadcasts
/// back in coalesced deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelUpdate {
    pub x: u16,
    pub y: u16,
    pub color: ColorIndex,
}

impl PixelUpdate {
    pub fn new(x: u16, y: u16, color: ColorIndex) -> Self {
        PixelUpdate { x, y, color }
    }
}
