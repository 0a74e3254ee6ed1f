//! Full-grid snapshot value.

use serde::{Deserialize, Serialize};

use crate::error::CanvasError;
use crate::palette::ColorIndex;

/// Dense copy of the whole canvas, row-major (`pixels[y * width + x]`).
///
/// Used for the initial frame sent to a newly opened connection and
/// for durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    pub width: u16,
    pub height: u16,
    pub pixels: Vec<ColorIndex>,
}

impl CanvasSnapshot {
    /// Number of cells implied by the dimensions.
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Check that the pixel array matches the dimensions.
    pub fn validate(&self) -> Result<(), CanvasError> {
        if self.width == 0 || self.height == 0 {
            return Err(CanvasError::EmptyCanvas {
                width: self.width,
                height: self.height,
            });
        }

        let expected = self.cell_count();
        if self.pixels.len() != expected {
            return Err(CanvasError::SnapshotSizeMismatch {
                expected,
                actual: self.pixels.len(),
            });
        }

        Ok(())
    }
}
