// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Replays the offline queue when connectivity returns.
//!
//! A drain snapshots the queue, replays every entry concurrently through the
//! retry executor and the entry's circuit breaker, then removes only the
//! entries that went through. Failed entries stay queued for the next drain.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use ferry_core::{ErrorContext, OperationQueue, QueuedOperation, RequestError};

use crate::breaker::BreakerRegistry;
use crate::probe::{ConnectivityProbe, ListenerId};
use crate::retry::RetryExecutor;

/// Re-issues a queued operation against the remote service.
///
/// The host owns the wire protocol; this crate only hands over what was
/// queued.
pub trait Replayer: Send + Sync {
    fn replay<'a>(
        &'a self,
        op: &'a QueuedOperation,
    ) -> Pin<Box<dyn Future<Output = Result<(), RequestError>> + Send + 'a>>;
}

/// Outcome of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

const REPORT_CAPACITY: usize = 16;

pub struct SyncEngine {
    probe: Arc<ConnectivityProbe>,
    queue: Arc<OperationQueue>,
    executor: Arc<RetryExecutor>,
    breakers: Arc<BreakerRegistry>,
    replayer: Arc<dyn Replayer>,
    max_attempts: u32,
    syncing: AtomicBool,
    reports: broadcast::Sender<SyncReport>,
    listener: Mutex<Option<ListenerId>>,
}

impl SyncEngine {
    pub fn new(
        probe: Arc<ConnectivityProbe>,
        queue: Arc<OperationQueue>,
        executor: Arc<RetryExecutor>,
        breakers: Arc<BreakerRegistry>,
        replayer: Arc<dyn Replayer>,
        max_attempts: u32,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        SyncEngine {
            probe,
            queue,
            executor,
            breakers,
            replayer,
            max_attempts,
            syncing: AtomicBool::new(false),
            reports,
            listener: Mutex::new(None),
        }
    }

    /// Whether a drain is running.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Receive a report after every drain that replayed something.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncReport> {
        self.reports.subscribe()
    }

    /// Replay the queue if online.
    ///
    /// Returns an empty report without doing anything when a drain is already
    /// running, the probe reports offline, or nothing is queued.
    pub async fn sync_when_online(&self) -> SyncReport {
        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            tracing::debug!("sync already running, skipping");
            return SyncReport::default();
        };

        if !self.probe.is_online() {
            tracing::debug!("offline, skipping sync");
            return SyncReport::default();
        }

        let pending = self.queue.drain_snapshot();
        if pending.is_empty() {
            return SyncReport::default();
        }

        tracing::info!(count = pending.len(), "replaying queued operations");
        let outcomes = join_all(pending.iter().map(|op| self.replay_one(op))).await;

        let mut done = Vec::new();
        let mut failed = 0;
        for (op, ok) in pending.into_iter().zip(outcomes) {
            if ok {
                done.push(op);
            } else {
                failed += 1;
            }
        }
        self.queue.remove_completed(&done);

        let report = SyncReport {
            succeeded: done.len(),
            failed,
        };
        tracing::info!(
            succeeded = report.succeeded,
            failed = report.failed,
            remaining = self.queue.count(),
            "sync finished"
        );
        // No subscribers is fine.
        let _ = self.reports.send(report);
        report
    }

    async fn replay_one(&self, op: &QueuedOperation) -> bool {
        let breaker = self.breakers.get_or_create(&op.dependency());
        let mut context = ErrorContext::new();
        context.insert("operation_id".into(), op.id.to_string());
        context.insert("kind".into(), op.kind.clone());
        context.insert("endpoint".into(), op.endpoint.clone());

        let result = self
            .executor
            .with_retry(
                || breaker.execute(|| self.replayer.replay(op)),
                self.max_attempts,
                Some(&context),
            )
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(id = %op.id, "replayed");
                true
            }
            Err(err) => {
                tracing::warn!(
                    id = %op.id,
                    error_id = %err.id,
                    kind = %err.kind,
                    "replay failed, keeping in queue: {}",
                    err.message
                );
                false
            }
        }
    }

    /// Start a drain on every offline to online transition.
    ///
    /// Returns `false` if already attached.
    pub fn attach(self: &Arc<Self>) -> bool {
        let mut slot = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return false;
        }

        let engine = Arc::downgrade(self);
        let id = self.probe.add_listener(move |online| {
            if !online {
                return;
            }
            let Some(engine) = engine.upgrade() else {
                return;
            };
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        engine.sync_when_online().await;
                    });
                }
                Err(_) => {
                    tracing::warn!("back online outside a tokio runtime, sync not started");
                }
            }
        });
        *slot = Some(id);
        true
    }

    pub fn detach(&self) -> bool {
        let id = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match id {
            Some(id) => self.probe.remove_listener(id),
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// Holds the reentrancy flag for the length of a drain.
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
