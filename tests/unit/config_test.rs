//! Tests for configuration parsing and validation

use spoolkit::config::MIN_WORKER_STACK_SIZE;
use spoolkit::{EngineConfig, EngineError};

#[test]
fn test_default_config() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.thread_name_prefix, "spool");
    assert!(cfg.drain_on_shutdown);
    assert!(cfg.worker_stack_size.is_none());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_from_json_partial() {
    let cfg = EngineConfig::from_json_str(r#"{"thread_name_prefix":"etl","drain_on_shutdown":false}"#)
        .unwrap();
    assert_eq!(cfg.thread_name_prefix, "etl");
    assert!(!cfg.drain_on_shutdown);
    assert_eq!(cfg.event_buffer, EngineConfig::default().event_buffer);
}

#[test]
fn test_from_json_rejects_small_stack() {
    let input = format!(r#"{{"worker_stack_size":{}}}"#, MIN_WORKER_STACK_SIZE - 1);
    assert!(matches!(
        EngineConfig::from_json_str(&input),
        Err(EngineError::InvalidConfig(_))
    ));
}

#[test]
fn test_from_json_rejects_garbage() {
    assert!(EngineConfig::from_json_str("not json").is_err());
}

#[test]
fn test_builder_methods() {
    let cfg = EngineConfig::new()
        .with_thread_name_prefix("io")
        .with_worker_stack_size(MIN_WORKER_STACK_SIZE)
        .with_drain_on_shutdown(false)
        .with_default_retry_after_time_factor(2.5)
        .with_event_buffer(16);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.worker_stack_size, Some(MIN_WORKER_STACK_SIZE));
    assert!((cfg.default_retry_after_time_factor - 2.5).abs() < f64::EPSILON);
}

#[test]
fn test_invalid_values() {
    assert!(EngineConfig::new().with_event_buffer(0).validate().is_err());
    assert!(EngineConfig::new()
        .with_default_retry_after_time_factor(f64::INFINITY)
        .validate()
        .is_err());
    assert!(EngineConfig::new().with_thread_name_prefix("").validate().is_err());
}
