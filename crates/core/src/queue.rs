// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable queue of mutations waiting for connectivity.
//!
//! The queue lives in memory and is written through to the
//! [`PersistentStore`] under a single key on every change, so pending work
//! survives a restart. Entries are unique by [`OperationId`]: enqueueing an
//! existing id replaces that entry in place.
//!
//! Ordering is FIFO. Priority only matters when the queue overflows: the
//! lowest-priority entries (latest first among equal priorities) are dropped.
//!
//! Reading a snapshot does not remove anything. The caller removes entries
//! after it has processed them, so a crash mid-sync loses nothing.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::clock::ClockSource;
use crate::config::QueueConfig;
use crate::envelope::Envelope;
use crate::store::{PersistentStore, StoreError};

/// Store key holding the serialized queue.
const QUEUE_KEY: &str = "ferry:queue";

/// Caller-assigned identity of a queued operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    pub fn new(id: impl Into<String>) -> Self {
        OperationId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        OperationId::new(id)
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        OperationId(id)
    }
}

/// HTTP method used to replay an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A mutation waiting to be replayed.
///
/// Carries everything needed to re-issue the original request: what kind of
/// operation it was, where it goes, how, and the serialized body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: OperationId,
    pub kind: String,
    pub payload: Envelope<serde_json::Value>,
    pub endpoint: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub priority: i32,
    /// Set by the queue on every enqueue.
    #[serde(default)]
    pub enqueued_at_ms: u64,
}

impl QueuedOperation {
    pub fn new(
        id: impl Into<OperationId>,
        kind: impl Into<String>,
        method: HttpMethod,
        endpoint: impl Into<String>,
        payload: Envelope<serde_json::Value>,
    ) -> Self {
        QueuedOperation {
            id: id.into(),
            kind: kind.into(),
            payload,
            endpoint: endpoint.into(),
            method,
            priority: 0,
            enqueued_at_ms: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Name of the dependency this operation talks to.
    ///
    /// The authority (`host[:port]`) of an absolute URL, otherwise the first
    /// path segment of a relative endpoint.
    pub fn dependency(&self) -> String {
        let endpoint = self.endpoint.as_str();
        let rest = match endpoint.split_once("://") {
            Some((_, rest)) => rest,
            None => endpoint.trim_start_matches('/'),
        };
        let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
        match &rest[..end] {
            "" => "default".to_string(),
            name => name.to_string(),
        }
    }
}

/// Durable, deduplicated, size-bounded queue of pending operations.
pub struct OperationQueue {
    store: Arc<dyn PersistentStore>,
    clock: Arc<dyn ClockSource>,
    max_size: usize,
    entries: Mutex<Vec<QueuedOperation>>,
}

impl OperationQueue {
    /// Open the queue, loading any entries persisted by a previous run.
    ///
    /// Unreadable persisted state is logged and replaced by an empty queue.
    pub fn open(
        store: Arc<dyn PersistentStore>,
        clock: Arc<dyn ClockSource>,
        config: &QueueConfig,
    ) -> Self {
        let entries = match load(store.as_ref()) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "discarding unreadable operation queue");
                Vec::new()
            }
        };
        if !entries.is_empty() {
            tracing::info!(pending = entries.len(), "restored operation queue");
        }

        OperationQueue {
            store,
            clock,
            max_size: config.max_size,
            entries: Mutex::new(entries),
        }
    }

    /// Add an operation, or replace the pending one with the same id.
    ///
    /// Returns `false` if the queue could not be persisted; the queue is then
    /// left as it was.
    pub fn enqueue(&self, mut op: QueuedOperation) -> bool {
        op.enqueued_at_ms = self.clock.now_ms();
        let mut entries = self.lock();

        let mut next = entries.clone();
        match next.iter_mut().find(|existing| existing.id == op.id) {
            Some(existing) => {
                tracing::debug!(id = %op.id, "replacing queued operation");
                *existing = op;
            }
            None => next.push(op),
        }

        if next.len() > self.max_size {
            let dropped = trim_to(&mut next, self.max_size);
            for op in &dropped {
                tracing::warn!(
                    id = %op.id,
                    kind = %op.kind,
                    priority = op.priority,
                    "operation queue full, dropping lowest-priority entry"
                );
            }
        }

        if let Err(e) = save(self.store.as_ref(), &next) {
            tracing::error!(error = %e, "failed to persist operation queue");
            return false;
        }
        *entries = next;
        true
    }

    /// Number of pending operations.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All pending operations in queue order. Nothing is removed.
    pub fn drain_snapshot(&self) -> Vec<QueuedOperation> {
        self.lock().clone()
    }

    /// Remove operations that were processed from a snapshot.
    ///
    /// An entry is removed only if it is still exactly the one that was
    /// processed, so an operation replaced while it was being processed stays
    /// queued even when the replacement landed in the same millisecond.
    /// Returns the number removed.
    pub fn remove_completed(&self, done: &[QueuedOperation]) -> usize {
        if done.is_empty() {
            return 0;
        }
        let mut entries = self.lock();
        let next: Vec<QueuedOperation> = entries
            .iter()
            .filter(|op| !done.contains(op))
            .cloned()
            .collect();
        let removed = entries.len() - next.len();

        if let Err(e) = save(self.store.as_ref(), &next) {
            // Keep them; replaying again is preferable to losing track
            tracing::error!(error = %e, "failed to persist operation queue");
            return 0;
        }
        *entries = next;
        removed
    }

    /// Drop every pending operation.
    pub fn clear(&self) -> bool {
        let mut entries = self.lock();
        if let Err(e) = self.store.remove(QUEUE_KEY) {
            tracing::error!(error = %e, "failed to clear persisted operation queue");
            return false;
        }
        entries.clear();
        true
    }

    fn lock(&self) -> MutexGuard<'_, Vec<QueuedOperation>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keep the `max` highest-priority entries (earliest first among ties) in
/// their original order. Returns the dropped entries.
fn trim_to(entries: &mut Vec<QueuedOperation>, max: usize) -> Vec<QueuedOperation> {
    let mut ranked: Vec<usize> = (0..entries.len()).collect();
    ranked.sort_by(|&a, &b| {
        entries[b]
            .priority
            .cmp(&entries[a].priority)
            .then_with(|| entries[a].enqueued_at_ms.cmp(&entries[b].enqueued_at_ms))
            .then_with(|| a.cmp(&b))
    });

    let mut keep = vec![false; entries.len()];
    for &index in ranked.iter().take(max) {
        keep[index] = true;
    }

    let mut kept = Vec::with_capacity(max);
    let mut dropped = Vec::new();
    for (op, keep) in entries.drain(..).zip(keep) {
        if keep {
            kept.push(op);
        } else {
            dropped.push(op);
        }
    }
    *entries = kept;
    dropped
}

fn load(store: &dyn PersistentStore) -> Result<Vec<QueuedOperation>, StoreError> {
    match store.get(QUEUE_KEY)? {
        Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
        _ => Ok(Vec::new()),
    }
}

fn save(store: &dyn PersistentStore, entries: &[QueuedOperation]) -> Result<(), StoreError> {
    let json = serde_json::to_string(entries)?;
    store.set(QUEUE_KEY, &json)
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
