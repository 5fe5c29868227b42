// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tests for the bounded cache module.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use super::*;
use crate::clock::ManualClock;
use crate::store::MemoryStore;
use serde_json::json;

struct Fixture {
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    cache: BoundedCache,
}

fn fixture(config: CacheConfig) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000_000));
    let cache = BoundedCache::new(store.clone(), clock.clone(), config);
    Fixture {
        store,
        clock,
        cache,
    }
}

fn small_config(max_storage_bytes: usize) -> CacheConfig {
    CacheConfig {
        max_storage_bytes,
        ..CacheConfig::default()
    }
}

#[test]
fn test_ttl_expiry() {
    let f = fixture(CacheConfig::default());
    assert!(f.cache.cache_with_ttl("k", &json!({"v": 1}), Duration::from_millis(1000)));

    assert_eq!(f.cache.get::<serde_json::Value>("k"), Some(json!({"v": 1})));

    f.clock.advance(Duration::from_millis(1100));
    assert_eq!(f.cache.get::<serde_json::Value>("k"), None);

    // Expired read deletes the entry
    assert!(f.cache.is_empty());
}

#[test]
fn test_entry_alive_at_exact_ttl() {
    let f = fixture(CacheConfig::default());
    f.cache.cache_with_ttl("k", &5u32, Duration::from_millis(1000));

    f.clock.advance(Duration::from_millis(1000));
    assert_eq!(f.cache.get::<u32>("k"), Some(5));

    f.clock.advance(Duration::from_millis(1));
    assert_eq!(f.cache.get::<u32>("k"), None);
}

#[test]
fn test_default_ttl_applies() {
    let config = CacheConfig {
        default_ttl_ms: 50,
        ..CacheConfig::default()
    };
    let f = fixture(config);
    assert!(f.cache.cache("clients", &vec!["acme", "globex"]));

    f.clock.advance(Duration::from_millis(50));
    assert_eq!(
        f.cache.get::<Vec<String>>("clients"),
        Some(vec!["acme".to_string(), "globex".to_string()])
    );

    f.clock.advance(Duration::from_millis(51));
    assert_eq!(f.cache.get::<Vec<String>>("clients"), None);
}

#[test]
fn test_expiry_is_lazy() {
    let f = fixture(CacheConfig::default());
    f.cache.cache_with_ttl("k", &1u8, Duration::from_millis(10));
    f.clock.advance(Duration::from_secs(60));

    // Nothing sweeps the entry until it is read
    assert_eq!(f.cache.len(), 1);
    assert_eq!(f.cache.get::<u8>("k"), None);
    assert_eq!(f.cache.len(), 0);
}

#[test]
fn test_missing_key() {
    let f = fixture(CacheConfig::default());
    assert_eq!(f.cache.get::<u8>("nope"), None);
}

#[test]
fn test_overflow_rejects_write_and_evicts_oldest_half() {
    let f = fixture(small_config(1200));

    for i in 0..4 {
        assert!(f.cache.cache(&format!("k{i}"), &"x".repeat(100)));
        f.clock.advance(Duration::from_millis(10));
    }
    assert_eq!(f.cache.len(), 4);

    // Far too large for the remaining budget
    assert!(!f.cache.cache("big", &"y".repeat(2000)));

    assert_eq!(f.cache.len(), 2);
    assert_eq!(f.cache.get::<String>("k0"), None);
    assert_eq!(f.cache.get::<String>("k1"), None);
    assert!(f.cache.get::<String>("k2").is_some());
    assert!(f.cache.get::<String>("k3").is_some());
    assert_eq!(f.cache.get::<String>("big"), None);
}

#[test]
fn test_store_quota_rejection_is_handled() {
    let store = Arc::new(MemoryStore::with_quota(600));
    let clock = Arc::new(ManualClock::new(0));
    let cache = BoundedCache::new(store, clock.clone(), CacheConfig::default());

    assert!(cache.cache("a", &"x".repeat(100)));
    clock.advance(Duration::from_millis(1));
    assert!(cache.cache("b", &"x".repeat(100)));

    assert!(!cache.cache("c", &"z".repeat(600)));
    assert_eq!(cache.len(), 1);
    assert!(cache.get::<String>("b").is_some());
}

#[test]
fn test_replacing_entry_does_not_double_count() {
    let f = fixture(small_config(400));
    assert!(f.cache.cache("k", &"x".repeat(100)));
    assert!(f.cache.cache("k", &"x".repeat(100)));
    assert!(f.cache.cache("k", &"x".repeat(100)));
    assert_eq!(f.cache.len(), 1);
}

#[test]
fn test_evict_oldest() {
    let f = fixture(CacheConfig::default());
    for i in 0..5 {
        f.cache.cache(&format!("k{i}"), &i);
        f.clock.advance(Duration::from_millis(1));
    }

    assert_eq!(f.cache.evict_oldest(3), 3);
    assert_eq!(f.cache.get::<i32>("k2"), None);
    assert_eq!(f.cache.get::<i32>("k3"), Some(3));
    assert_eq!(f.cache.get::<i32>("k4"), Some(4));

    assert_eq!(f.cache.evict_oldest(10), 2);
    assert!(f.cache.is_empty());
}

#[test]
fn test_schema_version_mismatch_drops_entry() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));

    let old = BoundedCache::new(store.clone(), clock.clone(), CacheConfig::default());
    old.cache("report", &json!({"layout": "v1"}));

    let new = BoundedCache::new(
        store,
        clock,
        CacheConfig {
            schema_version: 2,
            ..CacheConfig::default()
        },
    );
    assert_eq!(new.get::<serde_json::Value>("report"), None);
    assert!(new.is_empty());
}

#[test]
fn test_shape_mismatch_keeps_entry() {
    let f = fixture(CacheConfig::default());
    f.cache.cache("k", &"text");
    assert_eq!(f.cache.get::<u64>("k"), None);
    assert_eq!(f.cache.get::<String>("k").as_deref(), Some("text"));
}

#[test]
fn test_corrupted_entry_is_dropped() {
    let f = fixture(CacheConfig::default());
    f.store.set("cache:k", "not json").unwrap();
    assert_eq!(f.cache.get::<u8>("k"), None);
    assert_eq!(f.store.get("cache:k").unwrap(), None);
}

#[test]
fn test_clear_keeps_foreign_keys() {
    let f = fixture(CacheConfig::default());
    f.store.set("ferry:queue", "[]").unwrap();
    f.cache.cache("a", &1);
    f.cache.cache("b", &2);

    f.cache.clear();
    assert!(f.cache.is_empty());
    assert_eq!(f.store.get("ferry:queue").unwrap().as_deref(), Some("[]"));
}

#[test]
fn test_remove() {
    let f = fixture(CacheConfig::default());
    f.cache.cache("a", &1);
    f.cache.remove("a");
    assert_eq!(f.cache.get::<i32>("a"), None);
}

#[test]
fn test_storage_usage() {
    let f = fixture(small_config(1000));
    f.store.set("abcd", "123456").unwrap();

    let usage = f.cache.storage_usage();
    assert_eq!(usage.used_bytes, 10);
    assert_eq!(usage.total_bytes, 1000);
    assert!((usage.pct - 1.0).abs() < 1e-9);
}

#[test]
fn test_entry_records_writer_version() {
    let f = fixture(CacheConfig::default());
    f.cache.cache("a", &1);
    let raw = f.store.get("cache:a").unwrap().unwrap();
    let entry: CacheEntry = serde_json::from_str(&raw).unwrap();
    assert_eq!(entry.key, "a");
    assert_eq!(entry.version, env!("CARGO_PKG_VERSION"));
    assert_eq!(entry.stored_at_ms, 1_000_000);
    assert_eq!(entry.data.schema_version, 1);
}
