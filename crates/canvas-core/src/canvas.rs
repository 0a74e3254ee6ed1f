//! The shared pixel grid.
//!
//! `Canvas` owns:
//! - a dense `width * height` array of palette indices,
//! - the set of cells dirtied since the last broadcast.
//!
//! It has no interior locking; the server wraps it in a mutex so that
//! `apply` and `drain_dirty` are atomic with respect to each other.

use std::collections::BTreeMap;

use crate::error::CanvasError;
use crate::palette::{is_valid_color, ColorIndex};
use crate::pixel::PixelUpdate;
use crate::snapshot::CanvasSnapshot;

/// Width x height grid of palette indices with dirty tracking.
#[derive(Debug, Clone)]
pub struct Canvas {
    width: u16,
    height: u16,

    cells: Vec<ColorIndex>,

    /// Pending broadcast entries keyed by `(y, x)`.
    ///
    /// Keying by row first makes drains come out row-major. Re-dirtying
    /// a cell overwrites its pending color instead of adding an entry.
    dirty: BTreeMap<(u16, u16), ColorIndex>,

    /// Bumped on every accepted update; lets the persistence loop skip
    /// saves when nothing changed.
    version: u64,
}

impl Canvas {
    pub fn new(width: u16, height: u16, default_color: ColorIndex) -> Result<Self, CanvasError> {
        if width == 0 || height == 0 {
            return Err(CanvasError::EmptyCanvas { width, height });
        }
        if !is_valid_color(default_color) {
            return Err(CanvasError::UnknownColor(default_color));
        }

        Ok(Canvas {
            width,
            height,
            cells: vec![default_color; width as usize * height as usize],
            dirty: BTreeMap::new(),
            version: 0,
        })
    }

    /// Rebuild a canvas from a stored snapshot. The dirty set starts empty.
    pub fn from_snapshot(snapshot: CanvasSnapshot) -> Result<Self, CanvasError> {
        snapshot.validate()?;

        if let Some(bad) = snapshot.pixels.iter().copied().find(|c| !is_valid_color(*c)) {
            return Err(CanvasError::UnknownColor(bad));
        }

        Ok(Canvas {
            width: snapshot.width,
            height: snapshot.height,
            cells: snapshot.pixels,
            dirty: BTreeMap::new(),
            version: 0,
        })
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty.len()
    }

    pub fn get(&self, x: u16, y: u16) -> Option<ColorIndex> {
        self.index_of(x, y).map(|i| self.cells[i])
    }

    /// Validate and apply a single update.
    ///
    /// On success the cell is written and `(x, y) -> color` is upserted
    /// into the dirty set. On failure nothing changes.
    pub fn apply(&mut self, update: PixelUpdate) -> Result<(), CanvasError> {
        let PixelUpdate { x, y, color } = update;

        let idx = self.index_of(x, y).ok_or(CanvasError::OutOfBounds {
            x,
            y,
            width: self.width,
            height: self.height,
        })?;

        if !is_valid_color(color) {
            return Err(CanvasError::UnknownColor(color));
        }

        self.cells[idx] = color;
        self.dirty.insert((y, x), color);
        self.version += 1;

        Ok(())
    }

    /// Take every pending dirty entry, leaving the set empty.
    pub fn drain_dirty(&mut self) -> Vec<PixelUpdate> {
        std::mem::take(&mut self.dirty)
            .into_iter()
            .map(|((y, x), color)| PixelUpdate { x, y, color })
            .collect()
    }

    /// Put drained updates back when their broadcast could not be scheduled.
    ///
    /// A cell that was dirtied again after the drain keeps its newer color.
    pub fn restore_dirty(&mut self, updates: Vec<PixelUpdate>) {
        for PixelUpdate { x, y, color } in updates {
            if self.index_of(x, y).is_some() {
                self.dirty.entry((y, x)).or_insert(color);
            }
        }
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        CanvasSnapshot {
            width: self.width,
            height: self.height,
            pixels: self.cells.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn index_of(&self, x: u16, y: u16) -> Option<usize> {
        if x < self.width && y < self.height {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::DEFAULT_COLOR;

    fn canvas() -> Canvas {
        Canvas::new(4, 3, DEFAULT_COLOR).unwrap()
    }

    #[test]
    fn new_canvas_is_filled_with_default() {
        let c = canvas();
        for y in 0..3 {
            for x in 0..4 {
                assert_eq!(c.get(x, y), Some(DEFAULT_COLOR));
            }
        }
        assert_eq!(c.get(4, 0), None);
        assert_eq!(c.get(0, 3), None);
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        assert!(matches!(
            Canvas::new(0, 10, DEFAULT_COLOR),
            Err(CanvasError::EmptyCanvas { .. })
        ));
    }

    #[test]
    fn redirtying_a_cell_keeps_one_entry() {
        let mut c = canvas();
        c.apply(PixelUpdate::new(1, 1, 3)).unwrap();
        c.apply(PixelUpdate::new(1, 1, 7)).unwrap();
        assert_eq!(c.dirty_len(), 1);
        assert_eq!(c.drain_dirty(), vec![PixelUpdate::new(1, 1, 7)]);
    }

    #[test]
    fn drain_is_row_major() {
        let mut c = canvas();
        c.apply(PixelUpdate::new(3, 2, 1)).unwrap();
        c.apply(PixelUpdate::new(0, 0, 2)).unwrap();
        c.apply(PixelUpdate::new(2, 0, 3)).unwrap();

        let drained = c.drain_dirty();
        assert_eq!(
            drained,
            vec![
                PixelUpdate::new(0, 0, 2),
                PixelUpdate::new(2, 0, 3),
                PixelUpdate::new(3, 2, 1),
            ]
        );
    }

    #[test]
    fn version_only_moves_on_accepted_updates() {
        let mut c = canvas();
        assert_eq!(c.version(), 0);
        c.apply(PixelUpdate::new(0, 0, 1)).unwrap();
        let _ = c.apply(PixelUpdate::new(9, 9, 1));
        let _ = c.apply(PixelUpdate::new(0, 0, 99));
        assert_eq!(c.version(), 1);
    }

    #[test]
    fn from_snapshot_rejects_bad_sizes_and_colors() {
        let short = CanvasSnapshot {
            width: 2,
            height: 2,
            pixels: vec![0; 3],
        };
        assert_eq!(
            Canvas::from_snapshot(short).unwrap_err(),
            CanvasError::SnapshotSizeMismatch {
                expected: 4,
                actual: 3
            }
        );

        let bad_color = CanvasSnapshot {
            width: 2,
            height: 1,
            pixels: vec![0, 200],
        };
        assert_eq!(
            Canvas::from_snapshot(bad_color).unwrap_err(),
            CanvasError::UnknownColor(200)
        );
    }
}
