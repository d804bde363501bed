use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

use super::columns::Column;

/// Current on-disk snapshot format.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Snapshot I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Snapshot backend rejected the write: {0}")]
    Rejected(String),
}

/// The full persisted state: every column in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub columns: Vec<Column>,
}

impl Snapshot {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            columns,
        }
    }
}

/// Where the column store keeps its snapshot.
///
/// `save` receives the complete state every time; implementations replace
/// the previous snapshot wholesale.
pub trait SnapshotBackend: Send + Sync {
    /// Returns `Ok(None)` when nothing has been saved yet (first run).
    fn load(&self) -> Result<Option<Snapshot>, PersistError>;

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError>;
}

/// JSON snapshot file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistError {
        PersistError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SnapshotBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        let snapshot: Snapshot =
            serde_json::from_str(&content).map_err(|source| PersistError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        if snapshot.version > SNAPSHOT_VERSION {
            tracing::warn!(
                path = %self.path.display(),
                version = snapshot.version,
                supported = SNAPSHOT_VERSION,
                "Snapshot written by a newer version, loading best-effort"
            );
        }
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        let encoded = serde_json::to_vec_pretty(snapshot).map_err(PersistError::Encode)?;
        atomic_write(&self.path, &encoded).map_err(|e| self.io_error(e))
    }
}

/// Writes `content` to a sibling temp file, syncs it, then renames it over
/// `dst`, so `dst` is never left half-written.
fn atomic_write(dst: &Path, content: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let suffix = uuid::Uuid::new_v4().simple();
    let temp_path = dst.with_extension(format!("tmp.{suffix}"));

    let result = (|| {
        let mut temp_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        temp_file.write_all(content)?;
        temp_file.sync_all()?;
        drop(temp_file);

        // Windows refuses to rename over an existing file
        #[cfg(windows)]
        if dst.exists() {
            std::fs::remove_file(dst)?;
        }

        std::fs::rename(&temp_path, dst)
    })();

    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

/// Keeps the snapshot in memory. Used for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    snapshot: Mutex<Option<Snapshot>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing snapshot, as if it had been saved before.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
            ..Self::default()
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Makes subsequent saves fail with [`PersistError::Rejected`].
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// The last saved snapshot.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SnapshotBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        Ok(self.snapshot())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(PersistError::Rejected("memory backend set to fail".into()));
        }
        *self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// Lets callers keep a handle on a shared backend (e.g. to inspect saves)
// while the store owns a boxed clone of the Arc.
impl<T: SnapshotBackend + ?Sized> SnapshotBackend for std::sync::Arc<T> {
    fn load(&self) -> Result<Option<Snapshot>, PersistError> {
        (**self).load()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), PersistError> {
        (**self).save(snapshot)
    }
}
