//! Daemon configuration.
//!
//! One [`ConveyorConfig`] is loaded at startup and its sections are passed
//! to each component's constructor. Every field has a default, so an empty
//! TOML file is a valid configuration.
//!
//! ```toml
//! shutdown_deadline_secs = 30
//!
//! [store]
//! path = "/var/lib/conveyor/conveyor.db"
//!
//! [workers]
//! count = 4
//!
//! [dispatcher]
//! disabled_events = ["pr-closed"]
//!
//! [[webhooks]]
//! name = "chat"
//! url = "https://hooks.example.com/T000/B000"
//! ```

use crate::notification::domain::EventType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors returned while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("invalid config {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Parser failure.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConveyorConfig {
    /// Embedded database settings.
    pub store: StoreConfig,
    /// Worker pool settings.
    pub workers: WorkerConfig,
    /// Notification dispatcher settings.
    pub dispatcher: DispatcherConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Webhook delivery channels.
    pub webhooks: Vec<WebhookConfig>,
    /// Seconds allowed for a graceful shutdown before the process exits.
    pub shutdown_deadline_secs: u64,
}

/// Embedded database settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file; sidecar `-wal` and `-shm` files live beside it.
    pub path: PathBuf,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u64,
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent workers.
    pub count: usize,
    /// How long an idle worker sleeps before polling again when no wake-up
    /// arrives.
    pub idle_poll_ms: u64,
}

/// Notification dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Sleep between polls when the outbox is empty.
    pub poll_interval_ms: u64,
    /// Period of the exhausted-promotion and purge pass.
    pub cleanup_interval_secs: u64,
    /// Age after which sent and skipped events are deleted.
    pub retention_days: u32,
    /// Attempts before a failing event is given up.
    pub max_attempts: u32,
    /// Per-channel delivery timeout.
    pub sender_timeout_ms: u64,
    /// Event types that are skipped instead of delivered.
    pub disabled_events: Vec<EventType>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// One webhook delivery channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Channel name used in logs.
    pub name: String,
    /// Endpoint receiving JSON payloads.
    pub url: String,
}

impl Default for ConveyorConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            workers: WorkerConfig::default(),
            dispatcher: DispatcherConfig::default(),
            logging: LoggingConfig::default(),
            webhooks: Vec::new(),
            shutdown_deadline_secs: 30,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("conveyor.db"),
            pool_size: 8,
            busy_timeout_ms: 5_000,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: 2,
            idle_poll_ms: 5_000,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2_000,
            cleanup_interval_secs: 3_600,
            retention_days: 7,
            max_attempts: 5,
            sender_timeout_ms: 5_000,
            disabled_events: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Text,
        }
    }
}

impl ConveyorConfig {
    /// Reads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the daemon cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.store.pool_size == 0, "store.pool_size"),
            (self.workers.count == 0, "workers.count"),
            (self.workers.idle_poll_ms == 0, "workers.idle_poll_ms"),
            (self.dispatcher.poll_interval_ms == 0, "dispatcher.poll_interval_ms"),
            (
                self.dispatcher.cleanup_interval_secs == 0,
                "dispatcher.cleanup_interval_secs",
            ),
            (self.dispatcher.max_attempts == 0, "dispatcher.max_attempts"),
            (
                self.dispatcher.sender_timeout_ms == 0,
                "dispatcher.sender_timeout_ms",
            ),
        ];
        if let Some((_, field)) = checks.into_iter().find(|(is_zero, _)| *is_zero) {
            return Err(ConfigError::Invalid {
                field,
                reason: "must be greater than zero",
            });
        }
        if self.store.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "store.path",
                reason: "must not be empty",
            });
        }
        if self.webhooks.iter().any(|hook| hook.url.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "webhooks.url",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    /// Returns the graceful shutdown deadline.
    #[must_use]
    pub const fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }
}

impl DispatcherConfig {
    /// Returns the idle poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the cleanup period.
    #[must_use]
    pub const fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Returns the per-channel delivery timeout.
    #[must_use]
    pub const fn sender_timeout(&self) -> Duration {
        Duration::from_millis(self.sender_timeout_ms)
    }

    /// Returns how long resolved events are kept.
    #[must_use]
    pub fn retention(&self) -> chrono::TimeDelta {
        chrono::TimeDelta::days(i64::from(self.retention_days))
    }

    /// Returns whether `event_type` is administratively disabled.
    #[must_use]
    pub fn is_disabled(&self, event_type: EventType) -> bool {
        self.disabled_events.contains(&event_type)
    }
}

impl WorkerConfig {
    /// Returns the idle poll interval.
    #[must_use]
    pub const fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}
