// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Retry with exponential backoff.
//!
//! [`RetryExecutor::with_retry`] runs an async operation, classifies every
//! failure through the [`ErrorClassifier`], and retries only failures marked
//! retryable. The wait before retry `n` (zero-indexed) is
//! `min(base_delay * 2^n, max_delay)`; with the defaults that is 1s, 2s, 4s,
//! ... capped at 30s.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use ferry_core::config::RetryConfig;
use ferry_core::{AppError, ErrorClassifier, ErrorContext};

/// Backoff timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-indexed).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs operations with classified, bounded retries.
pub struct RetryExecutor {
    classifier: Arc<ErrorClassifier>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(classifier: Arc<ErrorClassifier>, policy: RetryPolicy) -> Self {
        RetryExecutor { classifier, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Run `op`, retrying retryable failures up to `max_attempts` times.
    ///
    /// `op` is called at most `max_attempts + 1` times. A non-retryable
    /// failure is returned after the attempt that produced it. The returned
    /// error is always classified.
    pub async fn with_retry<F, Fut, T, E>(
        &self,
        mut op: F,
        max_attempts: u32,
        context: Option<&ErrorContext>,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + 'static,
    {
        let mut attempt = 0u32;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => self.classifier.classify(&e, context.cloned()),
            };

            if !err.retryable {
                tracing::debug!(
                    error_id = %err.id,
                    kind = %err.kind,
                    attempt,
                    "not retrying: {}",
                    err.message
                );
                return Err(err);
            }

            if attempt >= max_attempts {
                tracing::error!(
                    error_id = %err.id,
                    kind = %err.kind,
                    attempts = attempt + 1,
                    "giving up after retries: {}",
                    err.message
                );
                return Err(err);
            }

            let delay = self.policy.delay(attempt);
            tracing::warn!(
                error_id = %err.id,
                kind = %err.kind,
                attempt = attempt + 1,
                max_attempts,
                ?delay,
                "retrying after failure: {}",
                err.message
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
