// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Network awareness.
//!
//! [`ConnectivityProbe`] holds the current online/offline state and notifies
//! listeners on every genuine transition. The state is fed either by the host
//! calling [`ConnectivityProbe::set_online`] or by a background task polling a
//! [`ConnectivitySource`] once [`ConnectivityProbe::init`] has been called.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Callback invoked with the new online state.
pub type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// Handle returned by [`ConnectivityProbe::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Platform signal telling whether the network is reachable.
pub trait ConnectivitySource: Send + Sync {
    /// Check reachability once.
    fn check(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// Reachability check by opening a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpReachability {
    addr: String,
    timeout: Duration,
}

impl TcpReachability {
    /// Probe `addr` (`host:port`), giving up after `timeout`.
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        TcpReachability {
            addr: addr.into(),
            timeout,
        }
    }
}

impl ConnectivitySource for TcpReachability {
    fn check(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&self.addr))
                .await
            {
                Ok(Ok(_)) => true,
                Ok(Err(e)) => {
                    tracing::debug!(addr = %self.addr, error = %e, "reachability probe failed");
                    false
                }
                Err(_) => {
                    tracing::debug!(addr = %self.addr, "reachability probe timed out");
                    false
                }
            }
        })
    }
}

/// Online/offline state with transition listeners.
pub struct ConnectivityProbe {
    online: AtomicBool,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
    /// Cancels the polling task; `Some` while initialized.
    poller: Mutex<Option<CancellationToken>>,
}

impl ConnectivityProbe {
    /// Create a probe in the given initial state.
    pub fn new(initially_online: bool) -> Self {
        ConnectivityProbe {
            online: AtomicBool::new(initially_online),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            poller: Mutex::new(None),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    /// Register a listener. Listeners run in registration order.
    pub fn add_listener(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock_listeners().push((id, Arc::new(listener)));
        id
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock_listeners();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    /// Record the current state, notifying listeners if it changed.
    ///
    /// Returns true if this was a transition. A panicking listener is logged
    /// and does not stop the others from running.
    pub fn set_online(&self, online: bool) -> bool {
        if self.online.swap(online, Ordering::AcqRel) == online {
            return false;
        }
        tracing::info!(online, "connectivity changed");

        // Snapshot so listeners may add or remove listeners while running
        let listeners: Vec<(ListenerId, Listener)> = self.lock_listeners().clone();
        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(online))).is_err() {
                tracing::error!(listener = id.0, online, "connectivity listener panicked");
            }
        }
        true
    }

    /// Start polling `source` every `interval`.
    ///
    /// Idempotent: while initialized, further calls do nothing and return
    /// false. Must be called within a tokio runtime; outside one the probe
    /// stays uninitialized and a warning is logged.
    pub fn init(self: &Arc<Self>, source: Arc<dyn ConnectivitySource>, interval: Duration) -> bool {
        let mut poller = self.lock_poller();
        if poller.is_some() {
            return false;
        }

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!("no tokio runtime, connectivity polling not started");
                return false;
            }
        };

        let token = CancellationToken::new();
        let probe = Arc::downgrade(self);
        let cancel = token.clone();
        handle.spawn(async move {
            loop {
                let online = tokio::select! {
                    _ = cancel.cancelled() => return,
                    online = source.check() => online,
                };
                match probe.upgrade() {
                    Some(probe) => {
                        probe.set_online(online);
                    }
                    None => return,
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
        });

        *poller = Some(token);
        tracing::debug!(?interval, "connectivity polling started");
        true
    }

    /// True between `init` and `dispose`.
    pub fn is_initialized(&self) -> bool {
        self.lock_poller().is_some()
    }

    /// Stop polling. The probe may be initialized again afterwards.
    pub fn dispose(&self) {
        if let Some(token) = self.lock_poller().take() {
            token.cancel();
            tracing::debug!("connectivity polling stopped");
        }
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_poller(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.poller.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ConnectivityProbe {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Drop for ConnectivityProbe {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
