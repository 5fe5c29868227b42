// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent key-value storage backing the cache and the operation queue.
//!
//! The store maps string keys to string values. Two implementations are
//! provided:
//!
//! - [`MemoryStore`]: process-local, optionally quota-limited (tests, ephemeral hosts)
//! - [`FileStore`]: a single JSON document on disk, rewritten and fsynced on
//!   every change so state survives restarts
//!
//! The store is single-writer: nothing here coordinates multiple processes
//! writing the same file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Write would take the store past its byte quota.
    #[error("storage quota exceeded: {requested} bytes requested, quota is {quota}")]
    QuotaExceeded { requested: usize, quota: usize },
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// String key-value storage with byte accounting.
///
/// Methods take `&self`; implementations use interior mutability so one
/// store can be shared between the cache and the queue.
pub trait PersistentStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// All keys currently stored, in ascending order.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Total bytes used by keys and values.
    fn used_bytes(&self) -> StoreResult<usize>;
}

fn entry_bytes(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

fn total_bytes(entries: &BTreeMap<String, String>) -> usize {
    entries.iter().map(|(k, v)| entry_bytes(k, v)).sum()
}

/// Size of `entries` after `key` is set to `value`.
fn projected_bytes(entries: &BTreeMap<String, String>, key: &str, value: &str) -> usize {
    let current = total_bytes(entries);
    let replaced = entries.get(key).map(|v| entry_bytes(key, v)).unwrap_or(0);
    current - replaced + entry_bytes(key, value)
}

fn lock(entries: &Mutex<BTreeMap<String, String>>) -> MutexGuard<'_, BTreeMap<String, String>> {
    entries.lock().unwrap_or_else(|e| e.into_inner())
}

/// In-memory store, optionally limited to a byte quota.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Create an unlimited in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes past `quota` bytes.
    pub fn with_quota(quota: usize) -> Self {
        MemoryStore {
            entries: Mutex::new(BTreeMap::new()),
            quota: Some(quota),
        }
    }
}

impl PersistentStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = lock(&self.entries);
        if let Some(quota) = self.quota {
            let requested = projected_bytes(&entries, key, value);
            if requested > quota {
                return Err(StoreError::QuotaExceeded { requested, quota });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        lock(&self.entries).remove(key);
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(lock(&self.entries).keys().cloned().collect())
    }

    fn used_bytes(&self) -> StoreResult<usize> {
        Ok(total_bytes(&lock(&self.entries)))
    }
}

/// File-backed store.
///
/// The whole map is held in memory and written as one JSON object on every
/// mutation. Writes go to a sibling temp file which is fsynced and renamed
/// over the original, so a crash mid-write leaves the previous state intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open or create a store at the given path.
    ///
    /// Missing parent directories are created. An empty file is treated as an
    /// empty store.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let entries = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(FileStore {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Default location: `<data_local_dir>/ferry/store.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_local_dir().map(|dir| dir.join("ferry").join("store.json"))
    }

    /// Returns the path to the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let json = serde_json::to_string(entries)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &self.path)?;

        Ok(())
    }
}

impl PersistentStore for FileStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = lock(&self.entries);
        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&entries) {
            // Keep memory consistent with what is on disk
            match previous {
                Some(old) => entries.insert(key.to_string(), old),
                None => entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = lock(&self.entries);
        if let Some(old) = entries.remove(key) {
            if let Err(e) = self.persist(&entries) {
                entries.insert(key.to_string(), old);
                return Err(e);
            }
        }
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(lock(&self.entries).keys().cloned().collect())
    }

    fn used_bytes(&self) -> StoreResult<usize> {
        Ok(total_bytes(&lock(&self.entries)))
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
