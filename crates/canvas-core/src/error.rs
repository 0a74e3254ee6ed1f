//! Error types for the canvas model.
//!
//! All of these are validation failures: the offending update is
//! discarded and the caller carries on.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CanvasError {
    /// Coordinate outside `0..width` x `0..height`. Never clamped.
    #[error("pixel ({x}, {y}) is outside the {width}x{height} canvas")]
    OutOfBounds {
        x: u16,
        y: u16,
        width: u16,
        height: u16,
    },

    /// Color index not present in the palette.
    #[error("color index {0} is not in the palette")]
    UnknownColor(u8),

    /// A snapshot whose pixel array does not match its dimensions.
    #[error("snapshot has {actual} pixels, expected {expected}")]
    SnapshotSizeMismatch { expected: usize, actual: usize },

    /// A zero-sized canvas was requested.
    #[error("canvas dimensions must be non-zero (got {width}x{height})")]
    EmptyCanvas { width: u16, height: u16 },
}
