// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end: work offline, come back online, watch the queue drain.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use ferry::{
    Envelope, Ferry, FerryConfig, HttpMethod, MemoryStore, MutationOutcome, QueuedOperation,
    Replayer, RequestError, SyncReport,
};

/// Remote that rejects everything while `down` is set.
#[derive(Default)]
struct FlakyRemote {
    down: Mutex<bool>,
    applied: Mutex<Vec<serde_json::Value>>,
}

impl Replayer for FlakyRemote {
    fn replay<'a>(
        &'a self,
        op: &'a QueuedOperation,
    ) -> Pin<Box<dyn Future<Output = Result<(), RequestError>> + Send + 'a>> {
        Box::pin(async move {
            if *self.down.lock().unwrap() {
                return Err(RequestError::transport("ECONNRESET", "connection reset"));
            }
            let payload: serde_json::Value = op.payload.decode(1).unwrap().unwrap();
            self.applied.lock().unwrap().push(payload);
            Ok(())
        })
    }
}

fn note(id: &str, body: &str) -> QueuedOperation {
    QueuedOperation::new(
        id,
        "save_note",
        HttpMethod::Put,
        format!("https://notes.example.com/notes/{id}"),
        Envelope::encode(1, &serde_json::json!({ "id": id, "body": body })).unwrap(),
    )
}

#[tokio::test(start_paused = true)]
async fn edits_made_offline_reach_the_remote() {
    let remote = Arc::new(FlakyRemote::default());
    let mut config = FerryConfig::default();
    config.retry.base_delay_ms = 5;
    config.retry.max_delay_ms = 20;
    config.breaker.failure_threshold = 50;

    let ferry = Ferry::builder(config, Arc::clone(&remote) as Arc<dyn Replayer>)
        .store(Arc::new(MemoryStore::new()))
        .initially_online(false)
        .build()
        .unwrap();
    ferry.init();
    let mut reports = ferry.sync_engine().subscribe();

    assert!(ferry
        .submit_mutation(note("n1", "draft"))
        .await
        .unwrap()
        .is_queued());
    ferry.submit_mutation(note("n1", "final")).await.unwrap();
    ferry.submit_mutation(note("n2", "other")).await.unwrap();
    assert_eq!(ferry.pending_count(), 2);

    // Back online, but the remote still resets connections
    *remote.down.lock().unwrap() = true;
    ferry.probe().set_online(true);
    assert_eq!(
        reports.recv().await.unwrap(),
        SyncReport { succeeded: 0, failed: 2 }
    );
    assert_eq!(ferry.pending_count(), 2);

    // A live network failure also lands in the queue
    let outcome = ferry.submit_mutation(note("n3", "new")).await.unwrap();
    assert!(matches!(outcome, MutationOutcome::Queued(ref e) if e.is_network()));
    assert_eq!(ferry.pending_count(), 3);

    *remote.down.lock().unwrap() = false;
    let report = ferry.sync_when_online().await;
    assert_eq!(report, SyncReport { succeeded: 3, failed: 0 });
    assert_eq!(ferry.pending_count(), 0);

    let applied = remote.applied.lock().unwrap();
    let bodies: HashSet<&str> = applied
        .iter()
        .map(|v| v["body"].as_str().unwrap())
        .collect();
    assert_eq!(bodies, HashSet::from(["final", "other", "new"]));

    ferry.dispose();
}
