//! # spoolkit
//!
//! An in-process job scheduling engine built around named work queues
//! ("spools").
//!
//! Each spool orders its tasks by priority, then by arrival, and runs them
//! one at a time on a worker thread of its own. Spools are independent: a
//! slow task only delays its own spool.
//!
//! ## Key Features
//!
//! - **One-shot tasks**: submit a closure to a spool and get its outcome in a
//!   completion callback
//! - **Background services**: recurring payloads driven by an injected
//!   [`runtime::Timer`], never overlapping with themselves, with a retry delay
//!   after failures
//! - **Non-blocking shutdown**: `shutdown()` refuses new work immediately;
//!   `wait_to_close()` blocks until accepted work has drained
//! - **Status snapshots**: serde-serializable views of the spooler and every
//!   service
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use spoolkit::core::{Engine, EngineError};
//!
//! fn main() -> Result<(), EngineError> {
//!     spoolkit::util::init_tracing();
//!     let engine = Engine::builder().build()?;
//!
//!     engine.run_one_shot("import", "io", 5, || Ok(()), |outcome| {
//!         if let Err(e) = outcome {
//!             eprintln!("import failed: {e}");
//!         }
//!     })?;
//!
//!     engine.start_service("scan", "scans", Duration::from_secs(10), || Ok(()))?;
//!
//!     engine.wait_to_close();
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Spools, executors, background services and the engine facade.
pub mod core;
/// Engine configuration.
pub mod config;
/// Builders assembling an engine from its parts.
pub mod builders;
/// Queue storage backing each spool.
pub mod infra;
/// Timer facilities driving background services.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::builders::EngineBuilder;
pub use crate::config::EngineConfig;
pub use crate::core::{
    AppResult, BackgroundService, Engine, EngineError, EngineStatus, ServiceTask, TaskError,
    TaskOutcome,
};
