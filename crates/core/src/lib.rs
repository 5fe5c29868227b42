// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! ferry-core: Synchronous building blocks of the ferry resilience layer
//!
//! This crate provides the error taxonomy and classifier, the persistent
//! store abstraction, the bounded TTL cache and the durable operation queue.
//! The async machinery (retry, circuit breaking, connectivity, sync) lives in
//! the `ferry` crate on top of these.

pub mod cache;
pub mod classify;
pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod queue;
pub mod store;

pub use cache::{BoundedCache, CacheEntry, StorageUsage};
pub use classify::{
    AppError, BreakerOpen, ErrorClassifier, ErrorContext, ErrorKind, RequestError, Severity,
};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use config::FerryConfig;
pub use envelope::Envelope;
pub use error::{Error, Result};
pub use queue::{HttpMethod, OperationId, OperationQueue, QueuedOperation};
pub use store::{FileStore, MemoryStore, PersistentStore, StoreError};
