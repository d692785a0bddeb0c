//! Core routing and execution engine.

pub mod cancel;
pub mod error;
pub mod fault;
pub mod options;
pub mod pool;
pub mod strategy;
pub mod task;
pub mod worker;

pub use cancel::{CancelReason, CancellationToken};
pub use error::{AppResult, QueueError};
pub use fault::{Fault, FaultHandler, LogFaultHandler};
pub use options::EnqueueOptions;
pub use pool::KeyedPool;
pub use strategy::Strategy;
pub use task::{
    ContextKey, Metadata, Task, TaskContext, Work, FAULT_RECOVERED, FAULT_TIME, FAULT_VALUE,
    RESERVED_METADATA_KEYS, STACK_TRACE, WORKER_ID,
};
pub use worker::WorkerState;
