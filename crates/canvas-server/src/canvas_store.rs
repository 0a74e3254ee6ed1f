//! Shared canvas behind a single lock.
//!
//! Never call into the connection registry while holding this lock.

use canvas_core::{Canvas, CanvasError, CanvasSnapshot, ColorIndex, PixelUpdate};
use parking_lot::Mutex;

pub struct CanvasStore {
    canvas: Mutex<Canvas>,
}

impl CanvasStore {
    pub fn new(canvas: Canvas) -> Self {
        CanvasStore {
            canvas: Mutex::new(canvas),
        }
    }

    pub fn apply(&self, update: PixelUpdate) -> Result<(), CanvasError> {
        self.canvas.lock().apply(update)
    }

    /// Apply a batch under one lock acquisition.
    ///
    /// Invalid entries are skipped; their errors are returned so the
    /// caller can log them.
    pub fn apply_all(&self, updates: &[PixelUpdate]) -> (usize, Vec<CanvasError>) {
        let mut canvas = self.canvas.lock();
        let mut applied = 0;
        let mut rejected = Vec::new();

        for update in updates {
            match canvas.apply(*update) {
                Ok(()) => applied += 1,
                Err(e) => rejected.push(e),
            }
        }

        (applied, rejected)
    }

    pub fn get(&self, x: u16, y: u16) -> Option<ColorIndex> {
        self.canvas.lock().get(x, y)
    }

    pub fn drain_dirty(&self) -> Vec<PixelUpdate> {
        self.canvas.lock().drain_dirty()
    }

    pub fn restore_dirty(&self, updates: Vec<PixelUpdate>) {
        self.canvas.lock().restore_dirty(updates);
    }

    pub fn snapshot(&self) -> CanvasSnapshot {
        self.canvas.lock().snapshot()
    }

    pub fn version(&self) -> u64 {
        self.canvas.lock().version()
    }

    /// Run `f` with the canvas locked.
    ///
    /// Used when a snapshot and a state change must be atomic with
    /// respect to drains.
    pub fn with_canvas<R>(&self, f: impl FnOnce(&Canvas) -> R) -> R {
        f(&self.canvas.lock())
    }
}
