//! Reconciler configuration.
//!
//! Every setting has a default; `from_env` overrides them from `FERRITE_*`
//! environment variables and fails fast on values that do not parse.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Width of the `name` columns; longer names cannot be stored.
pub const NAME_COLUMN_LENGTH: usize = 256;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

/// Remote dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Task queue site agents poll.
    #[serde(default = "default_task_queue")]
    pub task_queue: String,
    /// Upper bound on a whole workflow execution, enforced by the engine.
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    /// Deadline for starting a workflow and waiting on its result.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Deadline for the terminate call issued after a timeout.
    #[serde(default = "default_terminate_timeout_ms")]
    pub terminate_timeout_ms: u64,
    /// Maximum dispatches in flight per fan-out.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
}

fn default_task_queue() -> String {
    "site".to_string()
}

fn default_execution_timeout_secs() -> u64 {
    60
}

fn default_call_timeout_ms() -> u64 {
    45_000
}

fn default_terminate_timeout_ms() -> u64 {
    30_000
}

fn default_max_parallel() -> usize {
    8
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            task_queue: default_task_queue(),
            execution_timeout_secs: default_execution_timeout_secs(),
            call_timeout_ms: default_call_timeout_ms(),
            terminate_timeout_ms: default_terminate_timeout_ms(),
            max_parallel: default_max_parallel(),
        }
    }
}

impl DispatchConfig {
    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    #[must_use]
    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }
}

/// Advisory lock retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockConfig {
    /// Retries after the first failed attempt.
    #[serde(default = "default_lock_retries")]
    pub retries: u32,
    /// Backoff before the first retry; doubles on each further retry.
    #[serde(default = "default_lock_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound of the random jitter added to each backoff.
    #[serde(default = "default_lock_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_lock_retries() -> u32 {
    3
}

fn default_lock_base_delay_ms() -> u64 {
    300
}

fn default_lock_max_jitter_ms() -> u64 {
    100
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retries: default_lock_retries(),
            base_delay_ms: default_lock_base_delay_ms(),
            max_jitter_ms: default_lock_max_jitter_ms(),
        }
    }
}

/// Top-level reconciler configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconcilerConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub lock: LockConfig,
    /// Status details returned per entity in resource views.
    #[serde(default = "default_status_history_limit")]
    pub status_history_limit: i64,
    /// Maximum resource name length in characters, at most
    /// [`NAME_COLUMN_LENGTH`].
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
}

fn default_status_history_limit() -> i64 {
    20
}

fn default_max_name_length() -> usize {
    NAME_COLUMN_LENGTH
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
            lock: LockConfig::default(),
            status_history_limit: default_status_history_limit(),
            max_name_length: default_max_name_length(),
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from the process environment.
    ///
    /// - `FERRITE_TASK_QUEUE` (default `site`)
    /// - `FERRITE_WORKFLOW_EXECUTION_TIMEOUT_SECS` (default 60)
    /// - `FERRITE_DISPATCH_TIMEOUT_MS` (default 45000)
    /// - `FERRITE_TERMINATE_TIMEOUT_MS` (default 30000)
    /// - `FERRITE_DISPATCH_MAX_PARALLEL` (default 8, minimum 1)
    /// - `FERRITE_LOCK_RETRIES` (default 3)
    /// - `FERRITE_LOCK_BASE_DELAY_MS` (default 300)
    /// - `FERRITE_LOCK_MAX_JITTER_MS` (default 100)
    /// - `FERRITE_STATUS_HISTORY_LIMIT` (default 20, minimum 1)
    /// - `FERRITE_MAX_NAME_LENGTH` (default 256, 1 to 256)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            dispatch: DispatchConfig {
                task_queue: lookup("FERRITE_TASK_QUEUE")
                    .filter(|q| !q.trim().is_empty())
                    .unwrap_or(defaults.dispatch.task_queue),
                execution_timeout_secs: parse_var(
                    &lookup,
                    "FERRITE_WORKFLOW_EXECUTION_TIMEOUT_SECS",
                    defaults.dispatch.execution_timeout_secs,
                )?,
                call_timeout_ms: parse_var(
                    &lookup,
                    "FERRITE_DISPATCH_TIMEOUT_MS",
                    defaults.dispatch.call_timeout_ms,
                )?,
                terminate_timeout_ms: parse_var(
                    &lookup,
                    "FERRITE_TERMINATE_TIMEOUT_MS",
                    defaults.dispatch.terminate_timeout_ms,
                )?,
                max_parallel: parse_var(
                    &lookup,
                    "FERRITE_DISPATCH_MAX_PARALLEL",
                    defaults.dispatch.max_parallel,
                )?,
            },
            lock: LockConfig {
                retries: parse_var(&lookup, "FERRITE_LOCK_RETRIES", defaults.lock.retries)?,
                base_delay_ms: parse_var(
                    &lookup,
                    "FERRITE_LOCK_BASE_DELAY_MS",
                    defaults.lock.base_delay_ms,
                )?,
                max_jitter_ms: parse_var(
                    &lookup,
                    "FERRITE_LOCK_MAX_JITTER_MS",
                    defaults.lock.max_jitter_ms,
                )?,
            },
            status_history_limit: parse_var(
                &lookup,
                "FERRITE_STATUS_HISTORY_LIMIT",
                defaults.status_history_limit,
            )?,
            max_name_length: parse_var(
                &lookup,
                "FERRITE_MAX_NAME_LENGTH",
                defaults.max_name_length,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the reconciler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.max_parallel == 0 {
            return Err(invalid("FERRITE_DISPATCH_MAX_PARALLEL", "must be at least 1"));
        }
        if self.dispatch.call_timeout_ms == 0 {
            return Err(invalid("FERRITE_DISPATCH_TIMEOUT_MS", "must be greater than 0"));
        }
        if self.status_history_limit < 1 {
            return Err(invalid("FERRITE_STATUS_HISTORY_LIMIT", "must be at least 1"));
        }
        if self.max_name_length == 0 || self.max_name_length > NAME_COLUMN_LENGTH {
            return Err(invalid(
                "FERRITE_MAX_NAME_LENGTH",
                format!("must be between 1 and {NAME_COLUMN_LENGTH}"),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(var, e.to_string())),
    }
}

fn invalid(var: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.to_string(),
        message: message.into(),
    }
}
