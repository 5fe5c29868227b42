// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Resilience layer configuration.
//!
//! Configuration is read from a TOML file. Every field has a default, so an
//! empty or missing file yields a working configuration:
//!
//! ```toml
//! [cache]
//! default_ttl_ms = 86400000
//! max_storage_bytes = 5242880
//!
//! [queue]
//! max_size = 100
//!
//! [retry]
//! base_delay_ms = 1000
//! max_delay_ms = 30000
//! sync_max_attempts = 2
//!
//! [breaker]
//! failure_threshold = 5
//! recovery_timeout_ms = 60000
//!
//! [connectivity]
//! probe_addr = "api.example.com:443"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FerryConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Bounded cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when the caller does not give one (default: 24h).
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,
    /// Ceiling on the serialized size of the whole store (default: 5 MiB).
    #[serde(default = "default_max_storage_bytes")]
    pub max_storage_bytes: usize,
    /// Schema version stamped on cached envelopes (default: 1).
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

/// Operation queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of pending operations (default: 100).
    #[serde(default = "default_max_queue_size")]
    pub max_size: usize,
}

/// Retry/backoff settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry in milliseconds (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on any single delay in milliseconds (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Retries per entry when replaying the queue (default: 2).
    #[serde(default = "default_sync_max_attempts")]
    pub sync_max_attempts: u32,
}

/// Circuit breaker settings, applied to every dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker (default: 5).
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Cooldown before a trial call is allowed, in milliseconds (default: 60000).
    #[serde(default = "default_recovery_timeout_ms")]
    pub recovery_timeout_ms: u64,
}

/// Connectivity probing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// `host:port` probed with a TCP connect. Absent = no polling; the host
    /// feeds online/offline transitions itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_addr: Option<String>,
    /// Interval between probes in milliseconds (default: 5000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Connect timeout for a single probe in milliseconds (default: 3000).
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

/// Persistent store settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the store file. Absent = platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_ttl_ms() -> u64 {
    24 * 60 * 60 * 1000
}

fn default_max_storage_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_schema_version() -> u32 {
    1
}

fn default_max_queue_size() -> usize {
    100
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_sync_max_attempts() -> u32 {
    2
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_probe_timeout_ms() -> u64 {
    3000
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            default_ttl_ms: default_ttl_ms(),
            max_storage_bytes: default_max_storage_bytes(),
            schema_version: default_schema_version(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            max_size: default_max_queue_size(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            sync_max_attempts: default_sync_max_attempts(),
        }
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            failure_threshold: default_failure_threshold(),
            recovery_timeout_ms: default_recovery_timeout_ms(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        ConnectivityConfig {
            probe_addr: None,
            poll_interval_ms: default_poll_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl BreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

impl ConnectivityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl FerryConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FerryConfig::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: FerryConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration as TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject values that would disable a bound rather than configure it.
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_storage_bytes == 0 {
            return Err(Error::InvalidConfig {
                field: "cache.max_storage_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.queue.max_size == 0 {
            return Err(Error::InvalidConfig {
                field: "queue.max_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.breaker.failure_threshold == 0 {
            return Err(Error::InvalidConfig {
                field: "breaker.failure_threshold",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::InvalidConfig {
                field: "retry.base_delay_ms",
                reason: format!(
                    "{} exceeds retry.max_delay_ms ({})",
                    self.retry.base_delay_ms, self.retry.max_delay_ms
                ),
            });
        }
        if self.connectivity.probe_addr.is_some() && self.connectivity.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig {
                field: "connectivity.poll_interval_ms",
                reason: "must be greater than zero when probe_addr is set".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
