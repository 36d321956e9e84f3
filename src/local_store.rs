use crate::models::{SCHEMA_VERSION, YearStore};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

pub const STORAGE_KEY: &str = "days_of_year:v1";

/// Synchronous string key-value storage local to the device.
pub trait KeyValueStorage: Send + Sync {
    fn get_item(&self, key: &str) -> io::Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> io::Result<()>;
}

/// All keys live in one JSON object on disk.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> io::Result<BTreeMap<String, String>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err),
        };
        serde_json::from_slice(&bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }

    fn write_all(&self, items: &BTreeMap<String, String>) -> io::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let payload = serde_json::to_vec_pretty(items)?;
        let temp = self.path.with_extension("json.tmp");
        std::fs::write(&temp, payload)?;
        std::fs::rename(&temp, &self.path)
    }

    fn guard(&self) -> io::Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|err| io::Error::other(format!("storage lock poisoned: {err}")))
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        let _guard = self.guard()?;
        Ok(self.read_all()?.remove(key))
    }

    fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        let _guard = self.guard()?;
        let mut items = match self.read_all() {
            Ok(items) => items,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                warn!(path = %self.path.display(), "replacing unreadable storage file: {err}");
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        items.insert(key.to_string(), value.to_string());
        self.write_all(&items)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> io::Result<Option<String>> {
        let items = self
            .items
            .lock()
            .map_err(|err| io::Error::other(err.to_string()))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
        let mut items = self
            .items
            .lock()
            .map_err(|err| io::Error::other(err.to_string()))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Versioned snapshot of every day record on this device.
pub struct LocalStore {
    storage: Box<dyn KeyValueStorage>,
}

impl LocalStore {
    pub fn new(storage: impl KeyValueStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
        }
    }

    pub fn storage(&self) -> &dyn KeyValueStorage {
        self.storage.as_ref()
    }

    /// The stored snapshot stamped with `year`, or an empty one when the
    /// stored data is missing, unreadable, or of another schema version.
    pub fn load(&self, year: i32) -> YearStore {
        let raw = match self.storage.get_item(STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return YearStore::empty(year),
            Err(err) => {
                warn!("failed to read local store: {err}");
                return YearStore::empty(year);
            }
        };

        let value: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!("local store is not valid JSON: {err}");
                return YearStore::empty(year);
            }
        };

        match serde_json::from_value::<YearStore>(value) {
            Ok(store) if store.schema_version == SCHEMA_VERSION => YearStore { year, ..store },
            Ok(store) => {
                debug!(version = store.schema_version, "ignoring local store of another version");
                YearStore::empty(year)
            }
            Err(err) => {
                warn!("local store has an unexpected shape: {err}");
                YearStore::empty(year)
            }
        }
    }

    pub fn save(&self, store: &YearStore) -> io::Result<()> {
        let payload = serde_json::to_string(store)?;
        self.storage.set_item(STORAGE_KEY, &payload)
    }
}
