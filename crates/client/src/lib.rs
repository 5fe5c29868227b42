// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! ferry: offline-first resilience for clients of flaky remote services
//!
//! Mutations that cannot reach the network are parked in a durable queue
//! and replayed when connectivity returns. Calls go through classified
//! retries with exponential backoff and a circuit breaker per dependency.
//! [`Ferry`] assembles all of it; each piece is also usable on its own.

pub mod breaker;
pub mod logging;
pub mod probe;
pub mod retry;
pub mod service;
pub mod sync;

#[cfg(test)]
mod test_helpers;

pub use breaker::{BreakerRegistry, CircuitBreaker, CircuitError, CircuitState};
pub use probe::{ConnectivityProbe, ConnectivitySource, ListenerId, TcpReachability};
pub use retry::{RetryExecutor, RetryPolicy};
pub use service::{Ferry, FerryBuilder, MutationOutcome};
pub use sync::{Replayer, SyncEngine, SyncReport};

pub use ferry_core::{
    config, AppError, BoundedCache, ClockSource, Envelope, ErrorClassifier, ErrorContext,
    ErrorKind, FerryConfig, FileStore, HttpMethod, ManualClock, MemoryStore, OperationId,
    OperationQueue, PersistentStore, QueuedOperation, RequestError, Severity, StorageUsage,
    SystemClock,
};
