// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    config = { Error::Config("missing section".into()), "missing section" },
    quota = { Error::Store(StoreError::QuotaExceeded { requested: 10, quota: 5 }), "quota" },
)]
fn error_display_contains(err: Error, expected: &str) {
    assert!(err.to_string().contains(expected));
}

#[test]
fn error_invalid_config_display() {
    let err = Error::InvalidConfig {
        field: "queue.max_size",
        reason: "must be greater than zero".into(),
    };
    let msg = err.to_string();
    assert!(msg.contains("queue.max_size"));
    assert!(msg.contains("greater than zero"));
}

#[test]
fn error_from_io() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: Error = io_err.into();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn error_from_store() {
    let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
    let err: Error = StoreError::from(json_err).into();
    assert!(matches!(err, Error::Store(StoreError::Serialization(_))));
}

#[test]
fn error_from_toml() {
    let toml_err = toml::from_str::<toml::Table>("= broken").unwrap_err();
    let err: Error = toml_err.into();
    assert!(matches!(err, Error::Toml(_)));
}
