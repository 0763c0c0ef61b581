//! Tests for status snapshots and their JSON shape

use spoolkit::core::{BackgroundServiceStatus, EngineStatus, SpoolStatus, SpoolerStatus};

fn spooler_status() -> SpoolerStatus {
    SpoolerStatus {
        is_shutdown: false,
        created_threads_count: 2,
        spools: vec![SpoolStatus {
            name: "jobs".into(),
            pending_tasks: 4,
            worker_active: true,
            is_shutdown: false,
            submitted_tasks: 10,
            rejected_tasks: 0,
            completed_tasks: 5,
            failed_tasks: 1,
        }],
    }
}

#[test]
fn test_spool_status_json_keys() {
    let json = serde_json::to_value(spooler_status()).unwrap();
    assert_eq!(json["createdThreadsCount"], 2);
    assert_eq!(json["spools"][0]["pendingTasks"], 4);
    assert_eq!(json["spools"][0]["workerActive"], true);
}

#[test]
fn test_engine_status_round_trips() {
    let status = EngineStatus {
        spooler: spooler_status(),
        services: vec![BackgroundServiceStatus {
            name: "scan".into(),
            spool_name: "scans".into(),
            enabled: false,
            next_run_reference_delay_millis: 0,
            timed_interval_millis: 500,
            previous_scheduled_date_epoch_millis: 0,
            priority: -1,
            retry_after_time_factor: 1.5,
            sequential_error_count: 0,
            task_description: "scan".into(),
        }],
    };
    let parsed: EngineStatus = serde_json::from_str(&status.to_json().unwrap()).unwrap();
    assert_eq!(parsed, status);
}
