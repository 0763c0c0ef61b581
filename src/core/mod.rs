//! Core scheduling: spools, executors, background services and the engine facade.

pub mod audit;
pub mod engine;
pub mod error;
pub mod executor;
pub mod service;
pub mod spooler;
pub mod status;
pub mod task;

pub use audit::{EngineEvent, EventSink, InMemoryEventSink, RecordedEvent, TracingEventSink};
pub use engine::Engine;
pub use error::{AppResult, EngineError, TaskError, TaskOutcome};
pub use executor::SpoolExecutor;
pub use service::{retry_delay, BackgroundService, ServicePhase, MAX_RETRY_DELAY};
pub use spooler::Spooler;
pub use status::{BackgroundServiceStatus, EngineStatus, SpoolStatus, SpoolerStatus};
pub use task::{Completion, ServiceTask, Task, TaskAction, TaskQueue};
