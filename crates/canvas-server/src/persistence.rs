//! Durable canvas snapshots.
//!
//! The store is consulted once at startup and written on the snapshot
//! timer and at shutdown. File format is plain JSON:
//!
//! ```json
//! {"width":500,"height":500,"pixels":[29,29,...]}
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use canvas_core::{CanvasError, CanvasSnapshot};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("snapshot I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot is inconsistent: {0}")]
    Invalid(#[from] CanvasError),
}

/// Load/save collaborator for full-grid snapshots.
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<CanvasSnapshot>, PersistenceError>;

    fn save(&self, snapshot: &CanvasSnapshot) -> Result<(), PersistenceError>;
}

/// Snapshot kept in a single JSON file.
///
/// Writes go to a sibling temp file that is renamed over the target, so
/// a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "canvas_snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_err(&self, path: &Path, source: io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Option<CanvasSnapshot>, PersistenceError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(&self.path, e)),
        };

        let snapshot: CanvasSnapshot = serde_json::from_slice(&bytes)?;
        snapshot.validate()?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &CanvasSnapshot) -> Result<(), PersistenceError> {
        let json = serde_json::to_vec(snapshot)?;
        let tmp = self.temp_path();

        fs::write(&tmp, &json).map_err(|e| self.io_err(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(&self.path, e))?;
        Ok(())
    }
}
