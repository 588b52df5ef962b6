//! Cart snapshot persistence.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::state::CartSnapshot;

/// Failure reading or writing a snapshot.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("cart storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Stored data is not a cart snapshot.
    #[error("cart snapshot is malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// Keys must be non-empty and free of path separators.
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),
}

/// Key-value store for cart snapshots.
pub trait CartStorage: Send + Sync {
    /// Snapshot stored under `key`, or `None` if there is none.
    fn load(&self, key: &str) -> Result<Option<CartSnapshot>, StorageError>;
    /// Store `snapshot` under `key`, replacing any previous one.
    fn save(&self, key: &str, snapshot: &CartSnapshot) -> Result<(), StorageError>;
    /// Delete the snapshot under `key`. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<T: CartStorage + ?Sized> CartStorage for Arc<T> {
    fn load(&self, key: &str) -> Result<Option<CartSnapshot>, StorageError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, snapshot: &CartSnapshot) -> Result<(), StorageError> {
        (**self).save(key, snapshot)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

fn check_key(key: &str) -> Result<(), StorageError> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\'])
        || key.chars().any(char::is_control);
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryStorage
// ─────────────────────────────────────────────────────────────────────────────

/// In-process storage. Values are kept as JSON text.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON stored under `key`.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    /// Store raw text under `key`, bypassing serialization.
    pub fn insert_raw(&self, key: impl Into<String>, raw: impl Into<String>) {
        let _ = self.entries.lock().insert(key.into(), raw.into());
    }
}

impl CartStorage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<CartSnapshot>, StorageError> {
        check_key(key)?;
        self.entries
            .lock()
            .get(key)
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(StorageError::from)
    }

    fn save(&self, key: &str, snapshot: &CartSnapshot) -> Result<(), StorageError> {
        check_key(key)?;
        let raw = serde_json::to_string(snapshot)?;
        let _ = self.entries.lock().insert(key.to_string(), raw);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        check_key(key)?;
        let _ = self.entries.lock().remove(key);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FileStorage
// ─────────────────────────────────────────────────────────────────────────────

/// One `<key>.json` file per key under a directory.
///
/// Writes go to a sibling temp file that is renamed into place, so a crash
/// mid-write leaves the previous snapshot intact.
#[derive(Clone, Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Storage rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        check_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl CartStorage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<CartSnapshot>, StorageError> {
        let path = self.path_for(key)?;
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), bytes = raw.len(), "loaded cart snapshot");
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, key: &str, snapshot: &CartSnapshot) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
        std::fs::rename(&tmp, &path)?;
        debug!(path = %path.display(), items = snapshot.items.len(), "saved cart snapshot");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
