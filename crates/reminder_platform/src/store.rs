use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use reminder_domain::{KeyValueStore, StoreError};
use tracing::debug;

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Key-value store kept as one JSON object on disk.
///
/// The whole object is rewritten on every change through a sibling temp
/// file and a rename.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), keys = values.len(), "opened key-value file");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let payload = serde_json::to_string_pretty(values)?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, payload)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.write();
        let previous = values.insert(key.to_string(), value.to_string());
        if let Err(err) = self.flush(&values) {
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(err);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.write();
        if values.remove(key).is_some() {
            self.flush(&values)?;
        }
        Ok(())
    }
}
