//! Tokio runtime timer implementation.

use std::sync::Arc;
use std::time::Duration;

use crate::core::EngineError;
use crate::runtime::timer::{Timer, TimerCallback};

/// Tokio-based timer that sleeps on a tokio runtime, then runs the callback there.
#[derive(Clone)]
pub struct TokioTimer {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioTimer {
    /// Create a new `TokioTimer` from a tokio runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Create a `TokioTimer` on the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Timer` when called outside a tokio runtime.
    pub fn current() -> Result<Self, EngineError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| EngineError::Timer(e.to_string()))
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> Result<(), EngineError> {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Ok(())
    }
}

impl std::fmt::Debug for TokioTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioTimer").finish_non_exhaustive()
    }
}
