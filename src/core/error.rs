//! Error types for queue operations.

use thiserror::Error;

/// Errors returned synchronously by pool operations.
///
/// Faults raised inside a unit of work are never reported here: they are
/// recovered on the worker and surface through logging, the fault handler and
/// task metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The pool has not been started or has already been stopped.
    #[error("queue is not running")]
    NotRunning,
    /// The task's expiration time had already passed at submission.
    #[error("task already expired")]
    AlreadyExpired,
    /// The task's cancellation token had already fired at submission.
    #[error("task already cancelled")]
    AlreadyCancelled,
    /// An introspection call used a worker index outside the pool.
    #[error("invalid worker index {index} (pool size {size})")]
    InvalidWorkerIndex {
        /// Index that was requested.
        index: usize,
        /// Number of workers in the pool.
        size: usize,
    },
    /// A worker thread could not be spawned during start-up.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
