//! Durable key/value storage shared with status observers.
//!
//! Modelled on extension storage: values are JSON, writes are batched, and
//! every write that changes something emits one [`StorageChange`] listing
//! the keys that actually changed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the change notification queue per subscriber.
const CHANGE_QUEUE_CAPACITY: usize = 32;

// ============================================================================
// StorageArea
// ============================================================================

/// Storage scope a change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    /// Persistent, device-local storage.
    Local,
    /// Cleared when the browser session ends.
    Session,
    /// Synced across devices.
    Sync,
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::Session => "session",
            Self::Sync => "sync",
        })
    }
}

// ============================================================================
// StorageChange
// ============================================================================

/// Old and new value of one key.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    /// Value before the write, if the key existed.
    pub old_value: Option<Value>,
    /// Value after the write.
    pub new_value: Option<Value>,
}

/// Notification for one write.
#[derive(Debug, Clone)]
pub struct StorageChange {
    /// Area that was written.
    pub area: StorageArea,
    /// Changed keys.
    pub changes: FxHashMap<String, ValueChange>,
}

impl StorageChange {
    /// Returns the change for `key`, if it is part of this notification.
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ValueChange> {
        self.changes.get(key)
    }
}

// ============================================================================
// StatusStore
// ============================================================================

/// Durable storage the connection state is published to.
pub trait StatusStore: Send + Sync {
    /// Area this store writes to.
    fn area(&self) -> StorageArea;

    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the backing storage cannot be read.
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Writes all `items` as one batch.
    ///
    /// Called synchronously while a connection transition is published, so
    /// the next transition waits for it. Implementations should only do a
    /// small, bounded amount of work here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the batch cannot be persisted.
    fn set(&self, items: Map<String, Value>) -> Result<()>;

    /// Subscribes to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// Merges `items` into `data`, returning what changed.
fn apply(data: &mut Map<String, Value>, items: Map<String, Value>) -> FxHashMap<String, ValueChange> {
    let mut changes = FxHashMap::default();

    for (key, value) in items {
        let old_value = data.insert(key.clone(), value.clone());
        if old_value.as_ref() != Some(&value) {
            changes.insert(
                key,
                ValueChange {
                    old_value,
                    new_value: Some(value),
                },
            );
        }
    }

    changes
}

/// Sends a notification if anything changed.
fn notify(
    tx: &broadcast::Sender<StorageChange>,
    area: StorageArea,
    changes: FxHashMap<String, ValueChange>,
) {
    if changes.is_empty() {
        return;
    }

    debug!(%area, keys = changes.len(), "Storage changed");
    // No receivers is fine.
    let _ = tx.send(StorageChange { area, changes });
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store, lost on restart.
pub struct MemoryStore {
    area: StorageArea,
    data: Mutex<Map<String, Value>>,
    changes_tx: broadcast::Sender<StorageChange>,
}

impl MemoryStore {
    /// Creates an empty store for `area`.
    #[must_use]
    pub fn new(area: StorageArea) -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_QUEUE_CAPACITY);
        Self {
            area,
            data: Mutex::new(Map::new()),
            changes_tx,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StorageArea::Local)
    }
}

impl StatusStore for MemoryStore {
    fn area(&self) -> StorageArea {
        self.area
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, items: Map<String, Value>) -> Result<()> {
        let changes = {
            let mut data = self.data.lock();
            apply(&mut data, items)
        };
        notify(&self.changes_tx, self.area, changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes_tx.subscribe()
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// Store persisted as one JSON document on disk.
///
/// Writes go to a temporary file in the same directory which is then renamed
/// over the document, so readers never see a partial file.
pub struct FileStore {
    path: PathBuf,
    data: Mutex<Map<String, Value>>,
    changes_tx: broadcast::Sender<StorageChange>,
}

impl FileStore {
    /// Opens the store at `path`, creating parent directories.
    ///
    /// A missing file is an empty store. An unreadable document is replaced
    /// on the next write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::storage(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let data = Self::load(&path);
        let (changes_tx, _) = broadcast::channel(CHANGE_QUEUE_CAPACITY);

        debug!(path = %path.display(), keys = data.len(), "Status file opened");

        Ok(Self {
            path,
            data: Mutex::new(data),
            changes_tx,
        })
    }

    /// Path of the backing document.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Map<String, Value> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return Map::new(),
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(path = %path.display(), "Status file is not a JSON object, starting empty");
                Map::new()
            }
        }
    }

    fn persist(&self, data: &Map<String, Value>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let storage_err = |e: &dyn fmt::Display| {
            Error::storage(format!("cannot write {}: {e}", self.path.display()))
        };

        let mut file = NamedTempFile::new_in(dir).map_err(|e| storage_err(&e))?;
        serde_json::to_writer_pretty(&mut file, data).map_err(|e| storage_err(&e))?;
        file.flush().map_err(|e| storage_err(&e))?;
        file.persist(&self.path).map_err(|e| storage_err(&e.error))?;
        Ok(())
    }
}

impl StatusStore for FileStore {
    fn area(&self) -> StorageArea {
        StorageArea::Local
    }

    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, items: Map<String, Value>) -> Result<()> {
        let changes = {
            let mut data = self.data.lock();
            let mut next = data.clone();
            let changes = apply(&mut next, items);
            if !changes.is_empty() {
                self.persist(&next)?;
                *data = next;
            }
            changes
        };
        notify(&self.changes_tx, StorageArea::Local, changes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes_tx.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tempfile::TempDir;

    fn items(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_memory_store_set_and_get() {
        let store = MemoryStore::default();
        store.set(items(json!({ "isConnected": true }))).unwrap();
        assert_eq!(store.get("isConnected").unwrap(), Some(json!(true)));
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn test_change_lists_only_changed_keys() {
        let store = MemoryStore::default();
        store
            .set(items(json!({ "isConnected": false, "lastError": null })))
            .unwrap();

        let mut rx = store.subscribe();
        store
            .set(items(json!({ "isConnected": true, "lastError": null })))
            .unwrap();

        let change = rx.try_recv().expect("notification");
        assert_eq!(change.area, StorageArea::Local);
        assert_eq!(change.changes.len(), 1);

        let connected = change.get("isConnected").expect("isConnected changed");
        assert_eq!(connected.old_value, Some(json!(false)));
        assert_eq!(connected.new_value, Some(json!(true)));
    }

    #[test]
    fn test_unchanged_write_is_silent() {
        let store = MemoryStore::default();
        store.set(items(json!({ "isConnected": true }))).unwrap();

        let mut rx = store.subscribe();
        store.set(items(json!({ "isConnected": true }))).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("status.json");

        {
            let store = FileStore::open(&path).unwrap();
            store
                .set(items(json!({ "isConnected": true, "lastError": null })))
                .unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("isConnected").unwrap(), Some(json!(true)));
        assert_eq!(reopened.get("lastError").unwrap(), Some(Value::Null));
    }

    #[test]
    fn test_file_store_ignores_garbage() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        fs::write(&path, "[1, 2").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get("isConnected").unwrap(), None);

        store.set(items(json!({ "isConnected": false }))).unwrap();
        let on_disk: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, json!({ "isConnected": false }));
    }
}
