//! JSON file progress store
//!
//! Writes go to a sibling temporary file which is fsynced and then renamed
//! over the snapshot. A crash at any point leaves either the old snapshot or
//! the new one.
//!
//! The in-flight item lives in a small sibling file (`<snapshot>.in-flight`)
//! written the same way, so marking an item never rewrites the snapshot.

use crate::state::WorkItem;
use crate::storage::traits::{ProgressStore, SnapshotError, SnapshotResult};
use crate::storage::{ProgressSnapshot, SNAPSHOT_VERSION};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Snapshot store backed by a single JSON file
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes writers
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "progress.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(".tmp")
    }

    fn in_flight_path(&self) -> PathBuf {
        self.sibling(".in-flight")
    }

    /// Writes `bytes` to `path` through the fsynced temporary file `tmp`
    fn write_atomic(&self, path: &Path, tmp: &Path, bytes: &[u8]) -> SnapshotResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }

        {
            let mut file = File::create(tmp).map_err(|e| self.io_error(tmp, e))?;
            file.write_all(bytes).map_err(|e| self.io_error(tmp, e))?;
            file.sync_all().map_err(|e| self.io_error(tmp, e))?;
        }
        fs::rename(tmp, path).map_err(|e| self.io_error(path, e))
    }

    /// The recorded in-flight item, if any
    ///
    /// An unreadable marker is ignored.
    fn read_in_flight(&self) -> Option<WorkItem> {
        let path = self.in_flight_path();
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("Ignoring unreadable in-flight marker {}: {}", path.display(), e);
                None
            }
        }
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> SnapshotError {
        SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl ProgressStore for JsonFileStore {
    fn load(&self) -> SnapshotResult<Option<ProgressSnapshot>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        let mut snapshot: ProgressSnapshot =
            serde_json::from_str(&contents).map_err(|e| SnapshotError::Corrupt {
                path: self.path.clone(),
                message: e.to_string(),
            })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionMismatch {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        if let Some(item) = self.read_in_flight() {
            let finished = snapshot.processed.contains(&item.url);
            let listed = snapshot.in_flight.iter().any(|i| i.url == item.url);
            if !finished && !listed {
                snapshot.in_flight.push(item);
            }
        }

        tracing::debug!(
            "Loaded snapshot from {} ({} pending, {} visited)",
            self.path.display(),
            snapshot.pending.len(),
            snapshot.visited.len()
        );
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &ProgressSnapshot) -> SnapshotResult<()> {
        // A poisoned lock only means another writer panicked; the file itself is intact
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let json = serde_json::to_vec_pretty(snapshot)?;
        self.write_atomic(&self.path, &self.temp_path(), &json)?;

        tracing::trace!("Snapshot saved to {}", self.path.display());
        Ok(())
    }

    fn mark_in_flight(&self, item: Option<&WorkItem>) -> SnapshotResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let path = self.in_flight_path();
        match item {
            Some(item) => {
                let tmp = self.sibling(".in-flight.tmp");
                self.write_atomic(&path, &tmp, &serde_json::to_vec(item)?)
            }
            None => match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(self.io_error(&path, e)),
            },
        }
    }
}
