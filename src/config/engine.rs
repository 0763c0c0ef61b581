//! Engine configuration structures.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::EngineError;

/// Smallest worker stack size accepted.
pub const MIN_WORKER_STACK_SIZE: usize = 64 * 1024;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix for worker thread names (`{prefix}-{spool}-{n}`).
    pub thread_name_prefix: String,
    /// Worker thread stack size in bytes; platform default when unset.
    pub worker_stack_size: Option<usize>,
    /// Whether tasks queued before shutdown still run (`true`) or are discarded.
    pub drain_on_shutdown: bool,
    /// Retry-after-time factor given to newly created services.
    pub default_retry_after_time_factor: f64,
    /// Capacity of the in-memory event buffer built by the engine builder.
    pub event_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_name_prefix: "spool".into(),
            worker_stack_size: None,
            drain_on_shutdown: true,
            default_retry_after_time_factor: 1.0,
            event_buffer: 1024,
        }
    }
}

impl EngineConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_worker_stack_size(mut self, bytes: usize) -> Self {
        self.worker_stack_size = Some(bytes);
        self
    }

    /// Choose between draining or discarding queued tasks on shutdown.
    #[must_use]
    pub const fn with_drain_on_shutdown(mut self, drain: bool) -> Self {
        self.drain_on_shutdown = drain;
        self
    }

    /// Set the retry factor given to new services.
    #[must_use]
    pub const fn with_default_retry_after_time_factor(mut self, factor: f64) -> Self {
        self.default_retry_after_time_factor = factor;
        self
    }

    /// Set the in-memory event buffer capacity.
    #[must_use]
    pub const fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` describing the first invalid field.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "thread_name_prefix must not be empty".into(),
            ));
        }
        if let Some(size) = self.worker_stack_size {
            if size < MIN_WORKER_STACK_SIZE {
                return Err(EngineError::InvalidConfig(format!(
                    "worker_stack_size must be at least {MIN_WORKER_STACK_SIZE} bytes, got {size}"
                )));
            }
        }
        let factor = self.default_retry_after_time_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "default_retry_after_time_factor must be finite and positive, got {factor}"
            )));
        }
        if self.event_buffer == 0 {
            return Err(EngineError::InvalidConfig(
                "event_buffer must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` on parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, EngineError> {
        let cfg: Self = serde_json::from_str(input)
            .map_err(|e| EngineError::InvalidConfig(format!("parse error: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `SPOOLKIT_*` environment variables, reading a
    /// `.env` file first when one is present. Unset variables keep defaults.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` if a variable cannot be parsed or
    /// the result fails validation.
    pub fn from_env() -> Result<Self, EngineError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, EngineError> {
        let mut cfg = Self::default();
        if let Some(prefix) = lookup("SPOOLKIT_THREAD_NAME_PREFIX") {
            cfg.thread_name_prefix = prefix;
        }
        if let Some(raw) = lookup("SPOOLKIT_WORKER_STACK_SIZE") {
            cfg.worker_stack_size = Some(parse_var("SPOOLKIT_WORKER_STACK_SIZE", &raw)?);
        }
        if let Some(raw) = lookup("SPOOLKIT_DRAIN_ON_SHUTDOWN") {
            cfg.drain_on_shutdown = parse_var("SPOOLKIT_DRAIN_ON_SHUTDOWN", &raw)?;
        }
        if let Some(raw) = lookup("SPOOLKIT_RETRY_AFTER_TIME_FACTOR") {
            cfg.default_retry_after_time_factor =
                parse_var("SPOOLKIT_RETRY_AFTER_TIME_FACTOR", &raw)?;
        }
        if let Some(raw) = lookup("SPOOLKIT_EVENT_BUFFER") {
            cfg.event_buffer = parse_var("SPOOLKIT_EVENT_BUFFER", &raw)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_var<T>(key: &str, raw: &str) -> Result<T, EngineError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| EngineError::InvalidConfig(format!("{key}: {e}")))
}
