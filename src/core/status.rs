//! Immutable point-in-time status snapshots.
//!
//! Every value here is a copy taken at the moment of the call. Nothing keeps a
//! reference back into live engine state, so snapshots can be sent anywhere.
//! JSON field names follow the camelCase shape used by status consumers.

use serde::{Deserialize, Serialize};

/// Snapshot of a single spool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoolStatus {
    /// Spool name.
    pub name: String,
    /// Tasks accepted but not started.
    pub pending_tasks: usize,
    /// Whether a worker thread is currently alive for this spool.
    pub worker_active: bool,
    /// Whether the spool refuses new tasks.
    pub is_shutdown: bool,
    /// Tasks accepted since creation.
    pub submitted_tasks: u64,
    /// Submissions refused after shutdown.
    pub rejected_tasks: u64,
    /// Tasks that completed successfully.
    pub completed_tasks: u64,
    /// Tasks that failed, panicked or were discarded.
    pub failed_tasks: u64,
}

/// Snapshot of the spooler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoolerStatus {
    /// Whether shutdown has been initiated.
    pub is_shutdown: bool,
    /// Worker threads ever created, across all spools. Never decreases.
    pub created_threads_count: u64,
    /// Per-spool snapshots, sorted by name.
    pub spools: Vec<SpoolStatus>,
}

/// Snapshot of one background service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundServiceStatus {
    /// Service name.
    pub name: String,
    /// Spool the service submits its ticks to.
    pub spool_name: String,
    /// Whether the service is enabled.
    pub enabled: bool,
    /// Delay computed for the next tick, in milliseconds.
    pub next_run_reference_delay_millis: u64,
    /// Nominal interval between ticks, in milliseconds.
    pub timed_interval_millis: u64,
    /// When the last tick was scheduled, in milliseconds since epoch; `0` if never.
    pub previous_scheduled_date_epoch_millis: u64,
    /// Priority ticks are submitted with.
    pub priority: i32,
    /// Interval multiplier applied after a failed tick.
    pub retry_after_time_factor: f64,
    /// Consecutive failed ticks.
    pub sequential_error_count: u32,
    /// Description of the recurring payload.
    pub task_description: String,
}

/// Aggregate engine snapshot.
///
/// The spooler half and the services half are taken one after the other,
/// without a lock spanning both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    /// Spooler snapshot.
    pub spooler: SpoolerStatus,
    /// One snapshot per registered service, sorted by spool name.
    pub services: Vec<BackgroundServiceStatus>,
}

impl EngineStatus {
    /// Serialize to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; only non-finite retry factors can trigger it.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Status of the service bound to `spool`, if any.
    #[must_use]
    pub fn service(&self, spool: &str) -> Option<&BackgroundServiceStatus> {
        self.services.iter().find(|s| s.spool_name == spool)
    }
}
