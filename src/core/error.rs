//! Error types for engine operations and task outcomes.

use thiserror::Error;

/// Errors produced synchronously by the engine API.
///
/// These cover programmer errors and configuration problems. Failures that
/// happen *inside* scheduled work are never reported here, see [`TaskError`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The spooler has been shut down.
    #[error("engine is shut down")]
    Shutdown,
    /// An argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The timer facility refused or lost a scheduling request.
    #[error("timer error: {0}")]
    Timer(String),
}

/// Failure delivered to a task completion callback.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task action returned an error.
    #[error("task failed: {0:#}")]
    Failed(#[from] anyhow::Error),
    /// The task action panicked; the panic was caught at the executor boundary.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was queued but dropped by a spooler that does not drain on shutdown.
    #[error("task discarded before execution")]
    Discarded,
}

/// Result handed to a completion callback: `Ok(())` on success.
pub type TaskOutcome = Result<(), TaskError>;

/// Application-facing result using anyhow for task actions and higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

impl TaskError {
    /// Build a [`TaskError::Panicked`] from a caught panic payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked(message)
    }
}
