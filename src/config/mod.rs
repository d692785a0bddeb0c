//! Configuration models for pools and worker behavior.

pub mod pool;

pub use pool::{InFlightCancellation, PoolConfig, QueuesConfig, DEFAULT_BUFFER_CAPACITY, DEFAULT_WORKER_COUNT};
