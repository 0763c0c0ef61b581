//! Tests for error types

use spoolkit::{EngineError, TaskError};

#[test]
fn test_engine_error_display() {
    assert_eq!(EngineError::Shutdown.to_string(), "engine is shut down");
    assert_eq!(
        EngineError::InvalidArgument("spool name must not be empty".into()).to_string(),
        "invalid argument: spool name must not be empty"
    );
    assert!(EngineError::Timer("gone".into()).to_string().contains("gone"));
}

#[test]
fn test_task_error_from_anyhow_keeps_context() {
    let err: TaskError = anyhow::anyhow!("connection reset").context("fetching batch").into();
    let text = err.to_string();
    assert!(text.contains("fetching batch"));
    assert!(text.contains("connection reset"));
}

#[test]
fn test_discarded_display() {
    assert_eq!(TaskError::Discarded.to_string(), "task discarded before execution");
}
