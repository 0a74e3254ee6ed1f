//! canvas-core
//!
//! Pure pixel-canvas logic:
//! - palette (indexed colors)
//! - pixel updates
//! - the width x height grid with dirty tracking
//! - full-grid snapshots

pub mod palette;
pub mod pixel;
pub mod canvas;
pub mod snapshot;
pub mod error;

pub use palette::{ColorIndex, DEFAULT_COLOR, PALETTE, PALETTE_SIZE};
pub use pixel::PixelUpdate;
pub use canvas::Canvas;
pub use snapshot::CanvasSnapshot;
pub use error::CanvasError;
