//! Engine facade composing the spooler and background services.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::builders::EngineBuilder;
use crate::config::EngineConfig;
use crate::core::audit::{EventSink, TracingEventSink};
use crate::core::error::{AppResult, EngineError, TaskOutcome};
use crate::core::service::BackgroundService;
use crate::core::spooler::Spooler;
use crate::core::status::EngineStatus;
use crate::core::task::ServiceTask;
use crate::runtime::Timer;

/// Entry point for one-shot tasks and recurring services.
///
/// One-shot work goes straight to the named spool. Recurring work is
/// registered as a [`BackgroundService`], at most one per spool name, driven
/// by the injected [`Timer`].
pub struct Engine {
    config: EngineConfig,
    spooler: Arc<Spooler>,
    timer: Arc<dyn Timer>,
    events: Arc<dyn EventSink>,
    services: RwLock<HashMap<String, BackgroundService>>,
    /// Set under the `services` write lock once shutdown starts.
    closing: AtomicBool,
}

impl Engine {
    /// Create an engine with default configuration, logging events through `tracing`.
    #[must_use]
    pub fn new(timer: Arc<dyn Timer>) -> Self {
        let config = EngineConfig::default();
        let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
        Self::assemble(config, timer, events)
    }

    /// Create an engine from explicit parts.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidConfig` if `config` fails validation.
    pub fn with_parts(
        config: EngineConfig,
        timer: Arc<dyn Timer>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::assemble(config, timer, events))
    }

    /// Start building an engine.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    fn assemble(config: EngineConfig, timer: Arc<dyn Timer>, events: Arc<dyn EventSink>) -> Self {
        let spooler = Arc::new(Spooler::new(&config, Arc::clone(&events)));
        info!(prefix = %config.thread_name_prefix, drain_on_shutdown = config.drain_on_shutdown, "Engine created");
        Self {
            config,
            spooler,
            timer,
            events,
            services: RwLock::new(HashMap::new()),
            closing: AtomicBool::new(false),
        }
    }

    /// Configuration the engine was created with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying spooler.
    #[must_use]
    pub const fn spooler(&self) -> &Arc<Spooler> {
        &self.spooler
    }

    /// Submit a one-shot task to `spool`.
    ///
    /// Returns `Ok(false)` once the engine is shut down; the task never runs
    /// and `on_complete` is not called. Otherwise `on_complete` is called
    /// exactly once from the spool's worker.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidArgument` if `name` or `spool` is empty.
    pub fn run_one_shot<A, C>(
        &self,
        name: impl Into<String>,
        spool: &str,
        priority: i32,
        action: A,
        on_complete: C,
    ) -> Result<bool, EngineError>
    where
        A: FnOnce() -> AppResult<()> + Send + 'static,
        C: FnOnce(TaskOutcome) + Send + 'static,
    {
        let name = name.into();
        require_name("task", &name)?;
        require_name("spool", spool)?;
        Ok(self
            .spooler
            .executor(spool)
            .add_to_queue(name, priority, action, on_complete))
    }

    /// Get the service bound to `spool`, creating a disabled one if none exists.
    ///
    /// The first service registered for a spool wins: later calls return it
    /// even when `name` or `payload` differ.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidArgument` if `name` or `spool` is empty
    /// - `EngineError::Shutdown` if no service exists for `spool` and the
    ///   engine is shut down
    pub fn create_service<T>(
        &self,
        name: impl Into<String>,
        spool: &str,
        payload: T,
    ) -> Result<BackgroundService, EngineError>
    where
        T: ServiceTask,
    {
        let name = name.into();
        require_name("service", &name)?;
        require_name("spool", spool)?;

        if let Some(existing) = self.services.read().get(spool) {
            return Ok(existing.clone());
        }
        let mut services = self.services.write();
        if let Some(existing) = services.get(spool) {
            debug!(spool = %spool, existing = %existing.name(), requested = %name, "Service already registered for spool");
            return Ok(existing.clone());
        }
        if self.closing.load(Ordering::SeqCst) || self.spooler.is_shutdown() {
            return Err(EngineError::Shutdown);
        }

        let service = BackgroundService::new(
            name,
            spool,
            Arc::new(payload),
            Arc::clone(&self.spooler),
            Arc::clone(&self.timer),
            Arc::clone(&self.events),
            self.config.default_retry_after_time_factor,
        );
        services.insert(spool.to_string(), service.clone());
        info!(service = %service.name(), spool = %spool, "Service registered");
        Ok(service)
    }

    /// Create (or fetch) the service for `spool`, set its interval and enable it.
    ///
    /// # Errors
    ///
    /// Anything [`Engine::create_service`] or [`BackgroundService::enable`]
    /// returns, including `EngineError::InvalidArgument` for a zero interval.
    pub fn start_service<T>(
        &self,
        name: impl Into<String>,
        spool: &str,
        interval: Duration,
        payload: T,
    ) -> Result<BackgroundService, EngineError>
    where
        T: ServiceTask,
    {
        let service = self.create_service(name, spool, payload)?;
        service.set_timed_interval(interval).enable()?;
        Ok(service)
    }

    /// Service registered for `spool`, if any.
    #[must_use]
    pub fn service(&self, spool: &str) -> Option<BackgroundService> {
        self.services.read().get(spool).cloned()
    }

    /// Every registered service, sorted by spool name.
    #[must_use]
    pub fn services(&self) -> Vec<BackgroundService> {
        let mut services: Vec<_> = self.services.read().values().cloned().collect();
        services.sort_by(|a, b| a.spool_name().cmp(b.spool_name()));
        services
    }

    /// Disable every service and stop accepting work. Non-blocking and idempotent.
    ///
    /// The registry is closed under its write lock and the spooler is shut
    /// down before any service is disabled, so a concurrent `enable` or
    /// `create_service` either fails with `EngineError::Shutdown` or is
    /// undone here.
    pub fn shutdown(&self) {
        let services: Vec<BackgroundService> = {
            let services = self.services.write();
            self.closing.store(true, Ordering::SeqCst);
            services.values().cloned().collect()
        };
        self.spooler.shutdown();
        for service in services {
            service.disable();
        }
    }

    /// Shut down, then block until every accepted task has completed.
    ///
    /// Must not be called from inside a running task.
    pub fn wait_to_close(&self) {
        self.shutdown();
        self.spooler.wait_to_close();
        info!("Engine closed");
    }

    /// Point-in-time status of the spooler followed by every service.
    #[must_use]
    pub fn last_status(&self) -> EngineStatus {
        let spooler = self.spooler.last_status();
        let services = self
            .services()
            .iter()
            .map(BackgroundService::last_status)
            .collect();
        EngineStatus { spooler, services }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Signal shutdown but don't wait: workers finish accepted tasks on their own.
        self.shutdown();
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("spooler", &self.spooler)
            .field("services", &self.services.read().len())
            .finish_non_exhaustive()
    }
}

fn require_name(what: &str, value: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::InvalidArgument(format!("{what} name must not be empty")));
    }
    Ok(())
}
