// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for client tests.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ferry_core::config::{BreakerConfig, QueueConfig};
use ferry_core::{
    ClockSource, Envelope, ErrorClassifier, HttpMethod, ManualClock, MemoryStore, OperationQueue,
    PersistentStore, QueuedOperation, RequestError,
};

use crate::breaker::BreakerRegistry;
use crate::probe::{ConnectivityProbe, ConnectivitySource};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::sync::{Replayer, SyncEngine};

/// Counts calls made by an operation closure.
#[derive(Default)]
pub struct Attempts(AtomicU32);

impl Attempts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a call. Returns how many calls came before it.
    pub fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Connectivity source reporting whatever the test last set.
pub struct ScriptedSource {
    online: AtomicBool,
    checks: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(online: bool) -> Arc<Self> {
        Arc::new(ScriptedSource {
            online: AtomicBool::new(online),
            checks: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }
}

impl ConnectivitySource for ScriptedSource {
    fn check(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        let online = self.online.load(Ordering::SeqCst);
        Box::pin(async move { online })
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Status(u16),
    Transport,
}

impl Failure {
    fn to_error(self) -> RequestError {
        match self {
            Failure::Status(status) => RequestError::status(status, format!("HTTP {status}")),
            Failure::Transport => RequestError::transport("ECONNREFUSED", "connection refused"),
        }
    }
}

/// Replayer that succeeds unless told to fail for an id.
#[derive(Default)]
pub struct MockReplayer {
    failures: Mutex<HashMap<String, Failure>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockReplayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        MockReplayer {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail(&self, id: &str, failure: Failure) {
        self.failures.lock().unwrap().insert(id.to_string(), failure);
    }

    pub fn heal(&self, id: &str) {
        self.failures.lock().unwrap().remove(id);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == id).count()
    }
}

impl Replayer for MockReplayer {
    fn replay<'a>(
        &'a self,
        op: &'a QueuedOperation,
    ) -> Pin<Box<dyn Future<Output = Result<(), RequestError>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(op.id.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let failure = self.failures.lock().unwrap().get(op.id.as_str()).copied();
            match failure {
                Some(failure) => Err(failure.to_error()),
                None => Ok(()),
            }
        })
    }
}

pub fn make_op(id: &str, x: i64) -> QueuedOperation {
    QueuedOperation::new(
        id,
        "update_item",
        HttpMethod::Post,
        "https://api.example.com/items",
        Envelope::encode(1, &serde_json::json!({ "x": x })).unwrap(),
    )
}

/// Sync engine wired to in-memory parts, with fast backoff.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub probe: Arc<ConnectivityProbe>,
    pub queue: Arc<OperationQueue>,
    pub breakers: Arc<BreakerRegistry>,
    pub replayer: Arc<MockReplayer>,
    pub engine: Arc<SyncEngine>,
}

impl Harness {
    pub fn new(replayer: MockReplayer) -> Self {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Arc::new(MemoryStore::new());
        let probe = Arc::new(ConnectivityProbe::new(true));
        let queue = Arc::new(OperationQueue::open(
            Arc::clone(&store) as Arc<dyn PersistentStore>,
            Arc::clone(&clock) as Arc<dyn ClockSource>,
            &QueueConfig::default(),
        ));
        let breakers = Arc::new(BreakerRegistry::new(
            BreakerConfig::default(),
            Arc::clone(&clock) as Arc<dyn ClockSource>,
        ));
        let executor = Arc::new(RetryExecutor::new(
            Arc::new(ErrorClassifier::new()),
            RetryPolicy {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
            },
        ));
        let replayer = Arc::new(replayer);
        let engine = Arc::new(SyncEngine::new(
            Arc::clone(&probe),
            Arc::clone(&queue),
            executor,
            Arc::clone(&breakers),
            Arc::clone(&replayer) as Arc<dyn Replayer>,
            2,
        ));
        Harness {
            clock,
            store,
            probe,
            queue,
            breakers,
            replayer,
            engine,
        }
    }
}
