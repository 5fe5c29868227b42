// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! The assembled offline-first client.
//!
//! [`Ferry`] owns one of each component and wires them together: the probe
//! drives the sync engine, and mutations that fail for lack of a network are
//! parked in the queue instead of being lost.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ferry_core::{
    AppError, BoundedCache, ClockSource, Error, ErrorClassifier, ErrorContext, ErrorKind,
    FerryConfig, FileStore, OperationQueue, PersistentStore, QueuedOperation, Severity,
    StorageUsage, SystemClock,
};

use crate::breaker::BreakerRegistry;
use crate::probe::{ConnectivityProbe, ConnectivitySource, TcpReachability};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::sync::{Replayer, SyncEngine, SyncReport};

/// Result of [`Ferry::submit_mutation`].
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The remote accepted the operation.
    Completed,
    /// The network was unavailable; the operation waits in the queue.
    Queued(AppError),
}

impl MutationOutcome {
    pub fn is_queued(&self) -> bool {
        matches!(self, MutationOutcome::Queued(_))
    }
}

pub struct FerryBuilder {
    config: FerryConfig,
    replayer: Arc<dyn Replayer>,
    store: Option<Arc<dyn PersistentStore>>,
    clock: Option<Arc<dyn ClockSource>>,
    source: Option<Arc<dyn ConnectivitySource>>,
    initially_online: bool,
}

impl FerryBuilder {
    /// Use `store` instead of the file store named by the configuration.
    pub fn store(mut self, store: Arc<dyn PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Poll `source` instead of the configured probe address.
    pub fn source(mut self, source: Arc<dyn ConnectivitySource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn initially_online(mut self, online: bool) -> Self {
        self.initially_online = online;
        self
    }

    pub fn build(self) -> ferry_core::Result<Ferry> {
        let FerryBuilder {
            config,
            replayer,
            store,
            clock,
            source,
            initially_online,
        } = self;
        config.validate()?;

        let store = match store {
            Some(store) => store,
            None => {
                let path = match &config.store.path {
                    Some(path) => path.clone(),
                    None => FileStore::default_path().ok_or_else(|| {
                        Error::Config("no data directory for the store".to_string())
                    })?,
                };
                Arc::new(FileStore::open(path)?) as Arc<dyn PersistentStore>
            }
        };
        let clock = clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn ClockSource>);
        let source = source.or_else(|| {
            config.connectivity.probe_addr.as_ref().map(|addr| {
                Arc::new(TcpReachability::new(
                    addr.clone(),
                    config.connectivity.probe_timeout(),
                )) as Arc<dyn ConnectivitySource>
            })
        });

        let cache = Arc::new(BoundedCache::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            config.cache.clone(),
        ));
        let queue = Arc::new(OperationQueue::open(
            Arc::clone(&store),
            Arc::clone(&clock),
            &config.queue,
        ));
        let probe = Arc::new(ConnectivityProbe::new(initially_online));
        let classifier = Arc::new(ErrorClassifier::new());
        let executor = Arc::new(RetryExecutor::new(
            Arc::clone(&classifier),
            RetryPolicy::from(&config.retry),
        ));
        let breakers = Arc::new(BreakerRegistry::new(
            config.breaker.clone(),
            Arc::clone(&clock),
        ));
        let sync = Arc::new(SyncEngine::new(
            Arc::clone(&probe),
            Arc::clone(&queue),
            Arc::clone(&executor),
            Arc::clone(&breakers),
            Arc::clone(&replayer),
            config.retry.sync_max_attempts,
        ));

        Ok(Ferry {
            config,
            store,
            cache,
            queue,
            probe,
            classifier,
            executor,
            breakers,
            sync,
            replayer,
            source,
            initialized: AtomicBool::new(false),
        })
    }
}

pub struct Ferry {
    config: FerryConfig,
    store: Arc<dyn PersistentStore>,
    cache: Arc<BoundedCache>,
    queue: Arc<OperationQueue>,
    probe: Arc<ConnectivityProbe>,
    classifier: Arc<ErrorClassifier>,
    executor: Arc<RetryExecutor>,
    breakers: Arc<BreakerRegistry>,
    sync: Arc<SyncEngine>,
    replayer: Arc<dyn Replayer>,
    source: Option<Arc<dyn ConnectivitySource>>,
    initialized: AtomicBool,
}

impl Ferry {
    pub fn builder(config: FerryConfig, replayer: Arc<dyn Replayer>) -> FerryBuilder {
        FerryBuilder {
            config,
            replayer,
            store: None,
            clock: None,
            source: None,
            initially_online: true,
        }
    }

    /// Attach the sync engine and start connectivity polling if a source is
    /// configured. Idempotent; returns false if already initialized.
    pub fn init(&self) -> bool {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.sync.attach();
        if let Some(source) = &self.source {
            self.probe
                .init(Arc::clone(source), self.config.connectivity.poll_interval());
        }
        tracing::info!(
            pending = self.queue.count(),
            polling = self.probe.is_initialized(),
            "ferry initialized"
        );
        true
    }

    /// Stop polling and detach the sync engine. Safe to call repeatedly.
    pub fn dispose(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        self.probe.dispose();
        self.sync.detach();
        tracing::info!("ferry disposed");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Send a mutation now, or queue it if the network is unavailable.
    ///
    /// Offline, the operation is queued without an attempt. Online, it is
    /// replayed through the retry executor and its dependency's breaker; a
    /// network failure queues it, any other failure is returned.
    pub async fn submit_mutation(&self, op: QueuedOperation) -> Result<MutationOutcome, AppError> {
        if !self.probe.is_online() {
            let err = AppError::new(
                ErrorKind::Network,
                Severity::High,
                true,
                format!("offline, queued operation {}", op.id),
            );
            return self.park(op, err);
        }

        let breaker = self.breakers.get_or_create(&op.dependency());
        let mut context = ErrorContext::new();
        context.insert("operation_id".into(), op.id.to_string());
        context.insert("kind".into(), op.kind.clone());

        let result = self
            .executor
            .with_retry(
                || breaker.execute(|| self.replayer.replay(&op)),
                self.config.retry.sync_max_attempts,
                Some(&context),
            )
            .await;

        match result {
            Ok(()) => Ok(MutationOutcome::Completed),
            Err(err) if err.kind == ErrorKind::Network => self.park(op, err),
            Err(err) => Err(err),
        }
    }

    fn park(&self, op: QueuedOperation, reason: AppError) -> Result<MutationOutcome, AppError> {
        let id = op.id.clone();
        if !self.queue.enqueue(op) {
            return Err(AppError::new(
                ErrorKind::Storage,
                Severity::High,
                false,
                format!("failed to queue operation {id}"),
            ));
        }
        tracing::info!(id = %id, pending = self.queue.count(), "operation queued for later");
        Ok(MutationOutcome::Queued(reason))
    }

    /// Run an arbitrary call against `dependency` with retries and its
    /// circuit breaker.
    ///
    /// `op` is only invoked for attempts the breaker admits.
    pub async fn call<F, Fut, T, E>(
        &self,
        dependency: &str,
        max_attempts: u32,
        op: F,
    ) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let breaker = self.breakers.get_or_create(dependency);
        let mut context = ErrorContext::new();
        context.insert("dependency".into(), dependency.to_string());
        self.executor
            .with_retry(
                || breaker.execute(&op),
                max_attempts,
                Some(&context),
            )
            .await
    }

    /// Queue an operation without attempting it.
    pub fn enqueue(&self, op: QueuedOperation) -> bool {
        self.queue.enqueue(op)
    }

    pub fn pending_count(&self) -> usize {
        self.queue.count()
    }

    pub fn clear_queue(&self) -> bool {
        self.queue.clear()
    }

    pub async fn sync_when_online(&self) -> SyncReport {
        self.sync.sync_when_online().await
    }

    pub fn storage_usage(&self) -> StorageUsage {
        self.cache.storage_usage()
    }

    /// Classify any error the host ran into.
    pub fn classify(
        &self,
        err: &(dyn std::error::Error + 'static),
        context: Option<ErrorContext>,
    ) -> AppError {
        self.classifier.classify(err, context)
    }

    pub fn config(&self) -> &FerryConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    pub fn cache(&self) -> &BoundedCache {
        &self.cache
    }

    pub fn queue(&self) -> &OperationQueue {
        &self.queue
    }

    pub fn probe(&self) -> &Arc<ConnectivityProbe> {
        &self.probe
    }

    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    pub fn breakers(&self) -> &BreakerRegistry {
        &self.breakers
    }

    pub fn sync_engine(&self) -> &Arc<SyncEngine> {
        &self.sync
    }
}

impl Drop for Ferry {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
