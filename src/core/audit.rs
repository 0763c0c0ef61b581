//! Engine event sinks.
//!
//! Executors and background services report what they do as [`EngineEvent`]s.
//! Sinks only observe; nothing in the engine reads them back.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::util::clock::now_ms;

/// Something that happened inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A spool executor was registered.
    SpoolCreated {
        /// Spool name.
        spool: String,
    },
    /// A worker picked a task and is about to run it.
    TaskStarted {
        /// Task name.
        task: String,
        /// Spool name.
        spool: String,
    },
    /// A task finished, successfully or not.
    TaskFinished {
        /// Task name.
        task: String,
        /// Spool name.
        spool: String,
        /// Run time in milliseconds.
        elapsed_ms: u64,
        /// Error text when the task failed.
        error: Option<String>,
    },
    /// A submission was refused because the spool is shut down.
    TaskRejected {
        /// Task name.
        task: String,
        /// Spool name.
        spool: String,
    },
    /// A background service was enabled or disabled.
    ServiceEnabledChanged {
        /// Service name.
        service: String,
        /// Spool name.
        spool: String,
        /// New state.
        enabled: bool,
    },
    /// A background service armed its next tick.
    ServiceTickScheduled {
        /// Service name.
        service: String,
        /// Spool name.
        spool: String,
        /// Priority the tick will be submitted with.
        priority: i32,
        /// Delay before the tick fires, in milliseconds.
        delay_ms: u64,
    },
    /// A background service tick returned an error.
    ServiceTickFailed {
        /// Service name.
        service: String,
        /// Spool name.
        spool: String,
        /// Consecutive failed ticks, including this one.
        sequential_errors: u32,
    },
}

/// Timestamped event as stored by [`InMemoryEventSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Milliseconds since epoch when the event was recorded.
    pub at_ms: u128,
    /// The event itself.
    pub event: EngineEvent,
}

/// Event sink abstraction. Called from worker and timer threads.
pub trait EventSink: Send + Sync {
    /// Record an event. Must not block for long.
    fn record(&self, event: EngineEvent);
}

/// Sink that forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: EngineEvent) {
        match &event {
            EngineEvent::SpoolCreated { spool } => info!(spool = %spool, "spool created"),
            EngineEvent::TaskStarted { task, spool } => {
                debug!(task = %task, spool = %spool, "task started");
            }
            EngineEvent::TaskFinished {
                task,
                spool,
                elapsed_ms,
                error: None,
            } => debug!(task = %task, spool = %spool, elapsed_ms, "task finished"),
            EngineEvent::TaskFinished {
                task,
                spool,
                elapsed_ms,
                error: Some(error),
            } => warn!(task = %task, spool = %spool, elapsed_ms, error = %error, "task failed"),
            EngineEvent::TaskRejected { task, spool } => {
                warn!(task = %task, spool = %spool, "task rejected, spool is shut down");
            }
            EngineEvent::ServiceEnabledChanged {
                service,
                spool,
                enabled,
            } => info!(service = %service, spool = %spool, enabled, "service state changed"),
            EngineEvent::ServiceTickScheduled {
                service,
                spool,
                priority,
                delay_ms,
            } => debug!(service = %service, spool = %spool, priority, delay_ms, "next tick scheduled"),
            EngineEvent::ServiceTickFailed {
                service,
                spool,
                sequential_errors,
            } => warn!(service = %service, spool = %spool, sequential_errors, "service tick failed"),
        }
    }
}

/// Bounded in-memory sink for tests and diagnostics. Oldest events are evicted first.
pub struct InMemoryEventSink {
    events: Mutex<VecDeque<RecordedEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events.min(1024))),
            max_events: max_events.max(1),
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events matching a predicate, without timestamps.
    pub fn matching(&self, mut pred: impl FnMut(&EngineEvent) -> bool) -> Vec<EngineEvent> {
        self.events
            .lock()
            .iter()
            .filter(|r| pred(&r.event))
            .map(|r| r.event.clone())
            .collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn record(&self, event: EngineEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(RecordedEvent {
            at_ms: now_ms(),
            event,
        });
    }
}
