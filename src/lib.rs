//! # Prometheus Keyed Queue
//!
//! A key-ordered worker queue for per-entity background processing.
//!
//! Tasks are submitted with a string key. Every task sharing a key is executed
//! by the same worker, strictly in submission order, while tasks with different
//! keys run in parallel on other workers. This gives per-user or per-order
//! event handling ordered execution without a bespoke sharding layer.
//!
//! ## Key Features
//!
//! - **Key-based routing**: MurmurHash3 of the key picks the worker; same key, same worker
//! - **Round-robin routing**: even load when per-key order does not matter
//! - **Backpressure**: bounded per-worker buffers block the submitter when full
//! - **Expiration and cancellation**: checked at submission and again at dequeue
//! - **Fault isolation**: a panicking task never takes its worker down
//! - **Graceful shutdown**: `stop` drains every buffer before returning
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_keyed_queue::core::{EnqueueOptions, KeyedPool, Strategy};
//! use std::time::Duration;
//!
//! let pool = KeyedPool::new(3, 100, Strategy::KeyBased); // 3 workers, 100 buffered each
//! pool.start()?;
//!
//! pool.enqueue("user:123", |ctx| {
//!     println!("processing {} on worker {}", ctx.key(), ctx.worker_id());
//! })?;
//!
//! pool.enqueue_with(
//!     "order:456",
//!     |_ctx| println!("processing order 456"),
//!     EnqueueOptions::new().with_timeout(Duration::from_secs(5)),
//! )?;
//!
//! pool.stop();
//! ```
//!
//! For complete examples, see `tests/keyed_pool_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core routing, worker loop, and pool lifecycle.
pub mod core;
/// Configuration models for pools.
pub mod config;
/// Builders to construct pools from configuration.
pub mod builders;
/// Runtime adapters for external shutdown triggers.
pub mod runtime;
/// Shared utilities.
pub mod util;
