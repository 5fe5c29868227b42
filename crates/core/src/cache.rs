// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded TTL cache over a [`PersistentStore`].
//!
//! Each entry is stored under `cache:<key>` as a JSON [`CacheEntry`]. Expiry
//! is lazy: an expired entry stays on disk until the next read of its key or
//! until eviction removes it. There is no background sweep.
//!
//! Size is bounded by `max_storage_bytes`, measured over the whole backing
//! store (queue included). A write that would cross the bound evicts the
//! oldest half of the cached entries and reports failure; the write itself is
//! not retried.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::ClockSource;
use crate::config::CacheConfig;
use crate::envelope::Envelope;
use crate::store::PersistentStore;

/// Prefix separating cache entries from other keys in the store.
const KEY_PREFIX: &str = "cache:";

/// Version of the build that wrote an entry.
const WRITER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A cached value as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: Envelope<serde_json::Value>,
    pub stored_at_ms: u64,
    pub ttl_ms: u64,
    pub version: String,
}

impl CacheEntry {
    /// Returns true once more than `ttl_ms` has passed since the entry was stored.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.stored_at_ms) > self.ttl_ms
    }
}

/// Snapshot of backing store usage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StorageUsage {
    pub used_bytes: usize,
    pub total_bytes: usize,
    /// Percentage of `total_bytes` in use (may exceed 100).
    pub pct: f64,
}

/// Key-value cache with per-entry TTL and a hard size ceiling.
pub struct BoundedCache {
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn ClockSource>,
    config: CacheConfig,
}

fn store_key(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

impl BoundedCache {
    pub fn new(
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn ClockSource>,
        config: CacheConfig,
    ) -> Self {
        BoundedCache {
            store,
            clock,
            config,
        }
    }

    /// Cache `data` under `key` with the configured default TTL.
    pub fn cache<T: Serialize>(&self, key: &str, data: &T) -> bool {
        self.cache_with_ttl(key, data, self.config.default_ttl())
    }

    /// Cache `data` under `key`, expiring after `ttl`.
    ///
    /// Returns `false` when the value cannot be stored: serialization failed,
    /// the store would exceed its byte ceiling, or the store rejected the
    /// write. In the latter two cases the oldest half of entries is evicted
    /// before returning.
    pub fn cache_with_ttl<T: Serialize>(&self, key: &str, data: &T, ttl: Duration) -> bool {
        let entry = match Envelope::encode(self.config.schema_version, data) {
            Ok(data) => CacheEntry {
                key: key.to_string(),
                data,
                stored_at_ms: self.clock.now_ms(),
                ttl_ms: ttl.as_millis() as u64,
                version: WRITER_VERSION.to_string(),
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "cache value is not serializable");
                return false;
            }
        };
        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to serialize cache entry");
                return false;
            }
        };

        let skey = store_key(key);
        let projected = match self.projected_bytes(&skey, &json) {
            Some(bytes) => bytes,
            None => return false,
        };
        if projected > self.config.max_storage_bytes {
            tracing::warn!(
                key,
                projected,
                limit = self.config.max_storage_bytes,
                "cache write would exceed storage limit"
            );
            self.evict_half();
            return false;
        }

        if let Err(e) = self.store.set(&skey, &json) {
            tracing::warn!(key, error = %e, "cache write rejected by store");
            self.evict_half();
            return false;
        }
        true
    }

    /// Read the value cached under `key`.
    ///
    /// Returns `None` if the key is missing, expired, written under another
    /// schema version, or does not decode as `T`. Expired, stale-schema and
    /// unreadable entries are deleted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let skey = store_key(key);
        let raw = match self.store.get(&skey) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping unreadable cache entry");
                self.delete(&skey);
                return None;
            }
        };

        if entry.is_expired(self.clock.now_ms()) {
            tracing::debug!(key, "cache entry expired");
            self.delete(&skey);
            return None;
        }

        match entry.data.decode::<T>(self.config.schema_version) {
            Some(Ok(value)) => Some(value),
            Some(Err(e)) => {
                tracing::debug!(key, error = %e, "cache entry has unexpected shape");
                None
            }
            None => {
                tracing::debug!(
                    key,
                    found = entry.data.schema_version,
                    expected = self.config.schema_version,
                    "dropping cache entry from another schema version"
                );
                self.delete(&skey);
                None
            }
        }
    }

    /// Remove `key` from the cache.
    pub fn remove(&self, key: &str) {
        self.delete(&store_key(key));
    }

    /// Remove every cache entry. Other keys in the store are untouched.
    pub fn clear(&self) {
        for skey in self.cache_keys() {
            self.delete(&skey);
        }
    }

    /// Number of physically stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.cache_keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove the `count` entries with the oldest `stored_at`.
    ///
    /// Entries that cannot be parsed are treated as oldest. Returns the number
    /// removed.
    pub fn evict_oldest(&self, count: usize) -> usize {
        let mut aged: Vec<(u64, String)> = self
            .cache_keys()
            .into_iter()
            .map(|skey| {
                let stored_at = self
                    .store
                    .get(&skey)
                    .ok()
                    .flatten()
                    .and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok())
                    .map(|entry| entry.stored_at_ms)
                    .unwrap_or(0);
                (stored_at, skey)
            })
            .collect();
        aged.sort();

        let mut removed = 0;
        for (_, skey) in aged.into_iter().take(count) {
            if self.delete(&skey) {
                removed += 1;
            }
        }
        removed
    }

    /// Current usage of the backing store against the configured ceiling.
    pub fn storage_usage(&self) -> StorageUsage {
        let used_bytes = self.store.used_bytes().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to measure storage usage");
            0
        });
        let total_bytes = self.config.max_storage_bytes;
        let pct = if total_bytes == 0 {
            0.0
        } else {
            used_bytes as f64 / total_bytes as f64 * 100.0
        };
        StorageUsage {
            used_bytes,
            total_bytes,
            pct,
        }
    }

    fn evict_half(&self) {
        let count = self.len().div_ceil(2);
        let removed = self.evict_oldest(count);
        tracing::info!(removed, "evicted oldest cache entries");
    }

    fn projected_bytes(&self, skey: &str, value: &str) -> Option<usize> {
        let used = match self.store.used_bytes() {
            Ok(used) => used,
            Err(e) => {
                tracing::warn!(error = %e, "failed to measure storage usage");
                return None;
            }
        };
        let replaced = match self.store.get(skey) {
            Ok(Some(old)) => skey.len() + old.len(),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(error = %e, "cache read failed");
                return None;
            }
        };
        Some(used.saturating_sub(replaced) + skey.len() + value.len())
    }

    fn cache_keys(&self) -> Vec<String> {
        match self.store.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter(|k| k.starts_with(KEY_PREFIX))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list cache keys");
                Vec::new()
            }
        }
    }

    fn delete(&self, skey: &str) -> bool {
        match self.store.remove(skey) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = skey, error = %e, "failed to delete cache entry");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
