//! Builder assembling an [`Engine`] from configuration, timer and event sink.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::core::audit::{EventSink, InMemoryEventSink, TracingEventSink};
use crate::core::{Engine, EngineError};
use crate::runtime::{ThreadTimer, Timer};

/// Step-by-step engine construction.
///
/// Unset parts fall back to defaults: [`EngineConfig::default`], a fresh
/// [`ThreadTimer`] and a [`TracingEventSink`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    timer: Option<Arc<dyn Timer>>,
    events: Option<Arc<dyn EventSink>>,
    record_events: bool,
}

impl EngineBuilder {
    /// Start from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use this timer instead of a dedicated timer thread.
    #[must_use]
    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Send engine events to `sink`.
    #[must_use]
    pub fn events(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    /// Keep the last `event_buffer` events in memory. Ignored when a sink was
    /// given with [`EngineBuilder::events`].
    #[must_use]
    pub const fn record_events(mut self, record: bool) -> Self {
        self.record_events = record;
        self
    }

    /// Validate the configuration and build the engine.
    ///
    /// Returns the in-memory sink alongside the engine when
    /// [`EngineBuilder::record_events`] was requested and no other sink was set.
    ///
    /// # Errors
    ///
    /// - `EngineError::InvalidConfig` if the configuration is invalid
    /// - `EngineError::Timer` if the default timer thread cannot start
    pub fn build_recording(self) -> Result<(Engine, Option<Arc<InMemoryEventSink>>), EngineError> {
        self.config.validate()?;
        let timer = match self.timer {
            Some(timer) => timer,
            None => Arc::new(ThreadTimer::new()?),
        };
        let mut recorded = None;
        let events: Arc<dyn EventSink> = match (self.events, self.record_events) {
            (Some(sink), _) => sink,
            (None, true) => {
                let sink = Arc::new(InMemoryEventSink::new(self.config.event_buffer));
                recorded = Some(Arc::clone(&sink));
                sink
            }
            (None, false) => Arc::new(TracingEventSink),
        };
        let engine = Engine::with_parts(self.config, timer, events)?;
        Ok((engine, recorded))
    }

    /// Validate the configuration and build the engine.
    ///
    /// # Errors
    ///
    /// See [`EngineBuilder::build_recording`].
    pub fn build(self) -> Result<Engine, EngineError> {
        self.build_recording().map(|(engine, _)| engine)
    }
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("config", &self.config)
            .field("custom_timer", &self.timer.is_some())
            .field("custom_events", &self.events.is_some())
            .field("record_events", &self.record_events)
            .finish()
    }
}
