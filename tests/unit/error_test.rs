//! Tests for error types

use prometheus_keyed_queue::core::QueueError;

#[test]
fn test_not_running_error() {
    assert_eq!(format!("{}", QueueError::NotRunning), "queue is not running");
}

#[test]
fn test_already_expired_error() {
    assert_eq!(format!("{}", QueueError::AlreadyExpired), "task already expired");
}

#[test]
fn test_already_cancelled_error() {
    assert_eq!(format!("{}", QueueError::AlreadyCancelled), "task already cancelled");
}

#[test]
fn test_invalid_worker_index_error() {
    let err = QueueError::InvalidWorkerIndex { index: 7, size: 3 };
    assert_eq!(format!("{}", err), "invalid worker index 7 (pool size 3)");
}

#[test]
fn test_worker_spawn_error() {
    let err = QueueError::WorkerSpawn("out of threads".to_string());
    assert_eq!(format!("{}", err), "failed to spawn worker thread: out of threads");
}
