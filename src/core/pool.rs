//! Key-routed worker pool.
//!
//! A `KeyedPool` owns a fixed set of workers, each with its own bounded FIFO
//! buffer and OS thread. Tasks are routed by key, so under
//! [`Strategy::KeyBased`] every task with the same key is executed by the same
//! worker in admission order, while different keys proceed in parallel.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_keyed_queue::core::{EnqueueOptions, KeyedPool, Strategy};
//! use std::time::Duration;
//!
//! let pool = KeyedPool::new(3, 100, Strategy::KeyBased);
//! pool.start()?;
//!
//! pool.enqueue("user:123", |_ctx| println!("processing user 123"))?;
//! pool.enqueue_with(
//!     "order:456",
//!     |_ctx| println!("processing order 456"),
//!     EnqueueOptions::new().with_timeout(Duration::from_secs(5)),
//! )?;
//!
//! pool.stop();
//! ```
//!
//! # Shutdown
//!
//! `stop` takes the state lock exclusively for its whole sequence, while
//! `enqueue` holds it shared across the routing and the (possibly blocking)
//! send. An admission therefore either lands in a buffer before the drain
//! begins or observes the pool as stopped; buffers are closed only after every
//! worker has drained and exited.
//!
//! Work that calls `enqueue` on its own pool must not race with `stop`: the
//! call waits for the state lock that `stop` holds while joining that same
//! worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::error::QueueError;
use super::fault::{FaultHandler, LogFaultHandler};
use super::options::EnqueueOptions;
use super::strategy::{Router, Strategy};
use super::task::{Task, TaskContext};
use super::worker::{SharedFaultHandler, StateCell, Worker, WorkerState};
use crate::config::PoolConfig;

/// Lifecycle of a pool. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    NotStarted,
    Running,
    Stopped,
}

/// Everything that changes on start/stop, behind one lock.
struct PoolState {
    lifecycle: Lifecycle,
    /// Buffer write ends; cleared on stop to close the buffers.
    senders: Vec<Sender<Task>>,
    /// Dropping these broadcasts stop to the workers.
    stop_signals: Vec<Sender<()>>,
    /// Workers not yet started.
    idle_workers: Vec<Worker>,
    handles: Vec<JoinHandle<()>>,
}

pub(crate) struct PoolInner {
    config: PoolConfig,
    router: Router,
    state: RwLock<PoolState>,
    /// Mirror of `lifecycle == Running` for lock-free introspection.
    running: AtomicBool,
    /// Read ends kept for queue-length snapshots.
    queues: Vec<Receiver<Task>>,
    worker_states: Vec<StateCell>,
    fault_handler: SharedFaultHandler,
}

/// Pool of key-routed workers.
///
/// Cloning is cheap and yields another handle to the same pool.
#[derive(Clone)]
pub struct KeyedPool {
    inner: Arc<PoolInner>,
}

impl KeyedPool {
    /// Create a pool with `worker_count` workers, each buffering up to
    /// `buffer_capacity` tasks.
    ///
    /// Zero for either value falls back to 1 worker / capacity 100.
    #[must_use]
    pub fn new(worker_count: usize, buffer_capacity: usize, strategy: Strategy) -> Self {
        Self::from_config(
            PoolConfig::new()
                .with_worker_count(worker_count)
                .with_buffer_capacity(buffer_capacity)
                .with_strategy(strategy),
        )
    }

    /// Create a pool from a configuration. Workers are created but not started.
    #[must_use]
    pub fn from_config(config: PoolConfig) -> Self {
        Self::with_fault_handler(config, Arc::new(LogFaultHandler))
    }

    pub(crate) fn with_fault_handler(config: PoolConfig, handler: Arc<dyn FaultHandler>) -> Self {
        let config = config.normalized();
        let fault_handler: SharedFaultHandler = Arc::new(RwLock::new(handler));

        let size = config.worker_count;
        let mut senders = Vec::with_capacity(size);
        let mut stop_signals = Vec::with_capacity(size);
        let mut idle_workers = Vec::with_capacity(size);
        let mut queues = Vec::with_capacity(size);
        let mut worker_states = Vec::with_capacity(size);

        for id in 0..size {
            let (task_tx, task_rx) = bounded::<Task>(config.buffer_capacity);
            let (stop_tx, stop_rx) = bounded::<()>(0);
            let state = StateCell::new(WorkerState::NotStarted);

            idle_workers.push(Worker::new(
                id,
                task_rx.clone(),
                stop_rx,
                state.clone(),
                Arc::clone(&fault_handler),
                config.in_flight_cancellation,
            ));
            senders.push(task_tx);
            stop_signals.push(stop_tx);
            queues.push(task_rx);
            worker_states.push(state);
        }

        debug!(
            worker_count = size,
            buffer_capacity = config.buffer_capacity,
            strategy = %config.strategy,
            "KeyedPool created"
        );

        Self {
            inner: Arc::new(PoolInner {
                router: Router::new(config.strategy),
                config,
                state: RwLock::new(PoolState {
                    lifecycle: Lifecycle::NotStarted,
                    senders,
                    stop_signals,
                    idle_workers,
                    handles: Vec::with_capacity(size),
                }),
                running: AtomicBool::new(false),
                queues,
                worker_states,
                fault_handler,
            }),
        }
    }

    /// Start one thread per worker. No-op if already running or stopped.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::WorkerSpawn`] if a worker thread cannot be
    /// spawned; workers spawned so far are stopped and the pool is left
    /// stopped.
    pub fn start(&self) -> Result<(), QueueError> {
        let mut state = self.inner.state.write();
        match state.lifecycle {
            Lifecycle::Running => return Ok(()),
            Lifecycle::Stopped => {
                warn!("start() called on a stopped pool; pools cannot be restarted");
                return Ok(());
            }
            Lifecycle::NotStarted => {}
        }

        let workers = std::mem::take(&mut state.idle_workers);
        for (id, worker) in workers.into_iter().enumerate() {
            let name = format!("{}-{id}", self.inner.config.thread_name_prefix);
            match worker.spawn(name, self.inner.config.thread_stack_size) {
                Ok(handle) => state.handles.push(handle),
                Err(e) => {
                    // Nothing can have been admitted yet, so the buffers are empty.
                    state.lifecycle = Lifecycle::Stopped;
                    state.stop_signals.clear();
                    for handle in state.handles.drain(..) {
                        let _ = handle.join();
                    }
                    state.senders.clear();
                    // Workers that never got a thread are as final as the joined ones.
                    for cell in &self.inner.worker_states {
                        if cell.get() == WorkerState::NotStarted {
                            cell.set(WorkerState::Stopped);
                        }
                    }
                    warn!(worker_id = id, error = %e, "Failed to spawn worker thread");
                    return Err(QueueError::WorkerSpawn(e.to_string()));
                }
            }
        }

        state.lifecycle = Lifecycle::Running;
        self.inner.running.store(true, Ordering::Release);
        info!(
            worker_count = self.inner.config.worker_count,
            buffer_capacity = self.inner.config.buffer_capacity,
            strategy = %self.inner.config.strategy,
            "KeyedPool started"
        );
        Ok(())
    }

    /// Stop the pool and drain every buffer. No-op unless running.
    ///
    /// Blocks until every worker has processed (or skipped as expired or
    /// cancelled) all tasks buffered when stop began, then closes the buffers.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Submit `work` under `key` with default options.
    ///
    /// # Errors
    ///
    /// See [`enqueue_with`](Self::enqueue_with).
    pub fn enqueue<F>(&self, key: impl Into<String>, work: F) -> Result<usize, QueueError>
    where
        F: FnOnce(&TaskContext) + Send + 'static,
    {
        self.enqueue_with(key, work, EnqueueOptions::default())
    }

    /// Submit `work` under `key`, returning the index of the worker it was
    /// routed to.
    ///
    /// Blocks while the target worker's buffer is full.
    ///
    /// # Errors
    ///
    /// - [`QueueError::NotRunning`] if the pool is not running
    /// - [`QueueError::AlreadyExpired`] if the expiration time has passed
    /// - [`QueueError::AlreadyCancelled`] if the token has already fired
    pub fn enqueue_with<F>(&self, key: impl Into<String>, work: F, options: EnqueueOptions) -> Result<usize, QueueError>
    where
        F: FnOnce(&TaskContext) + Send + 'static,
    {
        let state = self.inner.state.read();
        if state.lifecycle != Lifecycle::Running {
            return Err(QueueError::NotRunning);
        }
        if options.is_expired() {
            return Err(QueueError::AlreadyExpired);
        }
        if options.is_cancelled() {
            return Err(QueueError::AlreadyCancelled);
        }

        let key = key.into();
        let index = self.inner.router.route(&key, self.inner.config.worker_count);
        let EnqueueOptions { cancellation, expire_at, metadata, context_values } = options;
        let task = Task::new(key, Box::new(work), cancellation, expire_at, metadata, context_values);

        debug!(worker_id = index, key = task.key(), task_id = %task.id(), "Enqueuing task");
        state.senders[index]
            .send(task)
            .map_err(|_| QueueError::NotRunning)?;
        Ok(index)
    }

    /// Replace the fault handler for every worker.
    pub fn set_fault_handler<H: FaultHandler>(&self, handler: H) {
        *self.inner.fault_handler.write() = Arc::new(handler);
    }

    /// Number of tasks buffered for worker `index`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidWorkerIndex`] if `index` is out of range.
    pub fn queue_len(&self, index: usize) -> Result<usize, QueueError> {
        self.inner
            .queues
            .get(index)
            .map(Receiver::len)
            .ok_or_else(|| QueueError::InvalidWorkerIndex { index, size: self.size() })
    }

    /// Number of tasks buffered across all workers.
    #[must_use]
    pub fn total_queue_len(&self) -> usize {
        self.inner.queues.iter().map(Receiver::len).sum()
    }

    /// State of worker `index`'s loop.
    ///
    /// Reports [`WorkerState::NotStarted`] until the pool is started and the
    /// worker's thread is up, and [`WorkerState::Stopped`] once it has exited.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidWorkerIndex`] if `index` is out of range.
    pub fn worker_state(&self, index: usize) -> Result<WorkerState, QueueError> {
        self.inner
            .worker_states
            .get(index)
            .map(StateCell::get)
            .ok_or_else(|| QueueError::InvalidWorkerIndex { index, size: self.size() })
    }

    /// Number of workers.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.config.worker_count
    }

    /// Per-worker buffer capacity.
    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.inner.config.buffer_capacity
    }

    /// Whether the pool is accepting tasks.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Routing strategy.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.inner.router.strategy()
    }

    /// Effective (normalized) configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> Weak<PoolInner> {
        Arc::downgrade(&self.inner)
    }
}

impl PoolInner {
    pub(crate) fn stop(&self) {
        let mut state = self.state.write();
        if state.lifecycle != Lifecycle::Running {
            return;
        }

        state.lifecycle = Lifecycle::Stopped;
        self.running.store(false, Ordering::Release);
        info!(buffered = self.queues.iter().map(Receiver::len).sum::<usize>(), "Stopping KeyedPool");

        state.stop_signals.clear();

        let worker_count = state.handles.len();
        for (idx, handle) in state.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                warn!(worker_id = idx, "Worker thread panicked");
            } else {
                debug!(worker_id = idx, "Worker joined");
            }
        }

        // Every loop has exited and no admission can hold the lock: safe to close.
        state.senders.clear();
        info!(worker_count = worker_count, "KeyedPool stopped");
    }
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // Signal stop but DON'T join: workers drain what is buffered and exit
        // on their own. Call stop() for a graceful, blocking shutdown.
        let state = self.state.get_mut();
        if state.lifecycle == Lifecycle::Running {
            state.lifecycle = Lifecycle::Stopped;
            state.stop_signals.clear();
            debug!("KeyedPool dropped without explicit stop - workers will be detached");
        }
    }
}

impl std::fmt::Debug for KeyedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyedPool")
            .field("size", &self.size())
            .field("buffer_capacity", &self.buffer_capacity())
            .field("strategy", &self.strategy())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
