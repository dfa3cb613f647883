//! Key-value stores: file-backed for real runs, in-memory for tests.
//! The file store keeps everything in one pretty-printed JSON object
//! (`defaults.json`) so it stays human-readable; every `set` writes through.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

use bgtasks_core::error::{BgTasksError, Result};
use bgtasks_core::traits::KeyValueStore;

/// File-based key-value store.
pub struct FileKvStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl FileKvStore {
    /// Open (or create) the store at `dir/defaults.json`.
    pub fn open(dir: &Path) -> Self {
        std::fs::create_dir_all(dir).ok();
        let path = dir.join("defaults.json");
        let values = Self::load(&path);
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Map<String, Value> {
        if !path.exists() {
            return Map::new();
        }
        match std::fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("⚠️ Failed to parse {}: {e}", path.display());
                Map::new()
            }),
            Err(e) => {
                tracing::warn!("⚠️ Failed to read {}: {e}", path.display());
                Map::new()
            }
        }
    }

    fn save(&self, values: &Map<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(values)?;
        // Atomic replace via temp file.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| BgTasksError::Store(format!("Write error: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| BgTasksError::Store(format!("Rename error: {e}")))?;
        tracing::debug!("💾 Saved {} keys to {}", values.len(), self.path.display());
        Ok(())
    }
}

impl KeyValueStore for FileKvStore {
    fn get(&self, key: &str) -> Option<Value> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value);
        self.save(&values)
    }
}

/// Volatile store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryKvStore {
    values: Mutex<Map<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKvStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        Ok(())
    }
}
