// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit breaker per remote dependency.
//!
//! A breaker starts closed and counts consecutive failures. At
//! `failure_threshold` it opens and rejects calls without running them. Once
//! `recovery_timeout` has passed since the last failure, the next call is let
//! through as a single trial: success closes the breaker, failure reopens it.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ferry_core::config::BreakerConfig;
use ferry_core::{BreakerOpen, ClockSource};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Error returned by [`CircuitBreaker::execute`].
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The call was rejected without running.
    #[error("{0}")]
    Open(#[source] BreakerOpen),
    /// The call ran and failed.
    #[error("{0}")]
    Inner(#[source] E),
}

impl<E> CircuitError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            CircuitError::Open(_) => None,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    last_failure_at_ms: Option<u64>,
    trial_in_flight: bool,
}

pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    clock: Arc<dyn ClockSource>,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout: Duration,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        CircuitBreaker {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            clock,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                last_failure_at_ms: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state. An open breaker past its cooldown still reports
    /// `Open` until a call arrives.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    /// Force the breaker closed and clear its failure count.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(breaker = %self.name, from = %inner.state, "circuit reset");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.last_failure_at_ms = None;
        inner.trial_in_flight = false;
    }

    /// Run `op` through the breaker.
    pub async fn execute<F, Fut, T, E>(&self, op: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let trial = self.admit()?;
        let mut guard = TrialGuard {
            breaker: self,
            trial,
            settled: false,
        };

        let result = op().await;
        guard.settled = true;
        match result {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                self.on_failure();
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Decide whether a call may run. Returns whether it is the trial call.
    fn admit<E>(&self) -> Result<bool, CircuitError<E>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(false),
            CircuitState::Open => {
                let now = self.clock.now_ms();
                let since = inner
                    .last_failure_at_ms
                    .map_or(u64::MAX, |at| now.saturating_sub(at));
                if u128::from(since) > self.recovery_timeout.as_millis() {
                    tracing::info!(breaker = %self.name, "circuit half-open, allowing trial call");
                    inner.state = CircuitState::HalfOpen;
                    inner.trial_in_flight = true;
                    Ok(true)
                } else {
                    Err(self.rejected())
                }
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    Err(self.rejected())
                } else {
                    inner.trial_in_flight = true;
                    Ok(true)
                }
            }
        }
    }

    fn rejected<E>(&self) -> CircuitError<E> {
        tracing::debug!(breaker = %self.name, "call rejected, circuit open");
        CircuitError::Open(BreakerOpen {
            name: self.name.clone(),
        })
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(breaker = %self.name, from = %inner.state, "circuit closed");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.trial_in_flight = false;
    }

    fn on_failure(&self) {
        let now = self.clock.now_ms();
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.last_failure_at_ms = Some(now);
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.trial_in_flight = false;
                tracing::warn!(breaker = %self.name, "trial call failed, circuit reopened");
            }
            CircuitState::Closed if inner.failures >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                tracing::warn!(
                    breaker = %self.name,
                    failures = inner.failures,
                    "circuit opened"
                );
            }
            _ => {}
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("failures", &self.failure_count())
            .finish()
    }
}

/// Counts an abandoned trial call as a failure so the breaker cannot stay
/// half-open forever.
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.on_failure();
        }
    }
}

/// One shared breaker per dependency name.
pub struct BreakerRegistry {
    config: BreakerConfig,
    clock: Arc<dyn ClockSource>,
    breakers: Mutex<BTreeMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig, clock: Arc<dyn ClockSource>) -> Self {
        BreakerRegistry {
            config,
            clock,
            breakers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }
        let breaker = Arc::new(CircuitBreaker::new(
            name,
            self.config.failure_threshold,
            self.config.recovery_timeout(),
            Arc::clone(&self.clock),
        ));
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        let breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers.get(name).cloned()
    }

    /// Snapshot of every breaker's state, by name.
    pub fn states(&self) -> BTreeMap<String, CircuitState> {
        let breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        breakers
            .iter()
            .map(|(name, breaker)| (name.clone(), breaker.state()))
            .collect()
    }

    pub fn reset_all(&self) {
        let breakers = self.breakers.lock().unwrap_or_else(|e| e.into_inner());
        for breaker in breakers.values() {
            breaker.reset();
        }
    }
}

#[cfg(test)]
#[path = "breaker_tests.rs"]
mod tests;
