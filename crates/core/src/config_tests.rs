// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use tempfile::tempdir;
use yare::parameterized;

#[test]
fn defaults_match_documented_values() {
    let config = FerryConfig::default();
    assert_eq!(config.cache.default_ttl(), Duration::from_secs(86_400));
    assert_eq!(config.cache.max_storage_bytes, 5 * 1024 * 1024);
    assert_eq!(config.queue.max_size, 100);
    assert_eq!(config.retry.base_delay(), Duration::from_secs(1));
    assert_eq!(config.retry.max_delay(), Duration::from_secs(30));
    assert_eq!(config.retry.sync_max_attempts, 2);
    assert_eq!(config.breaker.failure_threshold, 5);
    assert_eq!(config.breaker.recovery_timeout(), Duration::from_secs(60));
    assert_eq!(config.connectivity.probe_addr, None);
    assert!(config.validate().is_ok());
}

#[test]
fn empty_document_yields_defaults() {
    let config = FerryConfig::parse("").unwrap();
    assert_eq!(config, FerryConfig::default());
}

#[test]
fn partial_sections_keep_other_defaults() {
    let config = FerryConfig::parse(
        r#"
[queue]
max_size = 10

[breaker]
failure_threshold = 3

[connectivity]
probe_addr = "127.0.0.1:443"
"#,
    )
    .unwrap();

    assert_eq!(config.queue.max_size, 10);
    assert_eq!(config.breaker.failure_threshold, 3);
    assert_eq!(config.breaker.recovery_timeout_ms, 60_000);
    assert_eq!(config.connectivity.probe_addr.as_deref(), Some("127.0.0.1:443"));
    assert_eq!(config.connectivity.poll_interval(), Duration::from_secs(5));
}

#[parameterized(
    zero_storage = { "[cache]\nmax_storage_bytes = 0", "cache.max_storage_bytes" },
    zero_queue = { "[queue]\nmax_size = 0", "queue.max_size" },
    zero_threshold = { "[breaker]\nfailure_threshold = 0", "breaker.failure_threshold" },
    base_above_cap = { "[retry]\nbase_delay_ms = 5000\nmax_delay_ms = 100", "retry.base_delay_ms" },
    zero_poll = { "[connectivity]\nprobe_addr = \"a:1\"\npoll_interval_ms = 0", "connectivity.poll_interval_ms" },
)]
fn invalid_values_are_rejected(toml: &str, field: &str) {
    let err = FerryConfig::parse(toml).unwrap_err();
    assert!(err.to_string().contains(field), "{err}");
}

#[test]
fn malformed_toml_is_an_error() {
    let err = FerryConfig::parse("[queue\nmax_size = 1").unwrap_err();
    assert!(matches!(err, Error::Toml(_)));
}

#[test]
fn load_missing_file_returns_defaults() {
    let dir = tempdir().unwrap();
    let config = FerryConfig::load(&dir.path().join("ferry.toml")).unwrap();
    assert_eq!(config, FerryConfig::default());
}

#[test]
fn save_and_load_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ferry.toml");

    let mut config = FerryConfig::default();
    config.queue.max_size = 42;
    config.store.path = Some(dir.path().join("store.json"));
    config.save(&path).unwrap();

    let loaded = FerryConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
}
