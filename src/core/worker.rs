//! Per-worker processing loop.
//!
//! Each worker owns one bounded FIFO buffer and drains it on a dedicated OS
//! thread, one task at a time:
//!
//! ```text
//! NotStarted ──start──▶ Idle ──task──▶ Executing ──done/fault/cancel──▶ Idle
//!                        │
//!                        └──stop──▶ Draining ──buffer empty──▶ Stopped
//! ```
//!
//! Tasks carrying a cancellation token run on a helper thread so the worker can
//! react to the token firing mid-execution; see [`InFlightCancellation`].

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, Receiver, RecvError};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use super::cancel::{CancelReason, CancellationToken};
use super::fault::{run_isolated, FaultHandler, Outcome};
use super::task::Task;
use crate::config::InFlightCancellation;

/// Observable state of a worker's loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// The pool has not been started; no thread runs this worker yet.
    NotStarted,
    /// Waiting for the next task or the stop signal.
    Idle,
    /// A task is in flight.
    Executing,
    /// Stop received; flushing buffered tasks.
    Draining,
    /// Loop has exited.
    Stopped,
}

impl WorkerState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Executing => 1,
            Self::Draining => 2,
            Self::Stopped => 3,
            Self::NotStarted => 4,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Executing,
            2 => Self::Draining,
            4 => Self::NotStarted,
            _ => Self::Stopped,
        }
    }
}

/// Shared, lock-free view of a worker's state.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new(state: WorkerState) -> Self {
        Self(Arc::new(AtomicU8::new(state.to_u8())))
    }

    pub(crate) fn get(&self) -> WorkerState {
        WorkerState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: WorkerState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

/// Fault handler slot shared by every worker of a pool.
pub(crate) type SharedFaultHandler = Arc<RwLock<Arc<dyn FaultHandler>>>;

/// Entry point of a helper thread running one cancellable task.
type TaskThreadBody = Box<dyn FnOnce() + Send + 'static>;

fn spawn_task_thread(name: String, body: TaskThreadBody) -> io::Result<()> {
    thread::Builder::new().name(name).spawn(body).map(drop)
}

/// How a wait on an in-flight task ended.
enum Race {
    Finished(Result<Outcome, RecvError>),
    Fired(CancelReason),
}

/// One worker: a buffer receiver, a stop signal and its loop.
pub(crate) struct Worker {
    id: usize,
    queue: Receiver<Task>,
    stop: Receiver<()>,
    state: StateCell,
    fault_handler: SharedFaultHandler,
    in_flight: InFlightCancellation,
}

impl Worker {
    pub(crate) const fn new(
        id: usize,
        queue: Receiver<Task>,
        stop: Receiver<()>,
        state: StateCell,
        fault_handler: SharedFaultHandler,
        in_flight: InFlightCancellation,
    ) -> Self {
        Self { id, queue, stop, state, fault_handler, in_flight }
    }

    /// Spawn the worker's loop on a named OS thread.
    pub(crate) fn spawn(self, name: String, stack_size: Option<usize>) -> io::Result<JoinHandle<()>> {
        let mut builder = thread::Builder::new().name(name);
        if let Some(size) = stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(move || self.run())
    }

    fn run(&self) {
        debug!(worker_id = self.id, "Worker thread started");
        self.state.set(WorkerState::Idle);

        loop {
            select! {
                recv(self.queue) -> msg => match msg {
                    Ok(task) => self.process(task),
                    // Buffers are closed only after the loop exits; treat as stop.
                    Err(_) => break,
                },
                // The stop sender is dropped to broadcast; disconnect fires here.
                recv(self.stop) -> _ => break,
            }
        }

        self.drain();
        self.state.set(WorkerState::Stopped);
        info!(worker_id = self.id, "Worker shutdown complete");
    }

    /// Flush whatever is buffered without waiting for new arrivals.
    fn drain(&self) {
        self.state.set(WorkerState::Draining);
        info!(
            worker_id = self.id,
            buffered = self.queue.len(),
            "Draining queue before shutdown"
        );
        while let Ok(task) = self.queue.try_recv() {
            self.process(task);
            self.state.set(WorkerState::Draining);
        }
    }

    fn process(&self, task: Task) {
        if task.is_expired() {
            debug!(
                worker_id = self.id,
                key = task.key(),
                age = ?task.age(),
                "Skipping expired task"
            );
            return;
        }
        if task.is_cancelled() {
            debug!(worker_id = self.id, key = task.key(), "Skipping cancelled task");
            return;
        }

        self.state.set(WorkerState::Executing);
        match task.cancellation().cloned() {
            Some(token) => self.execute_racing(task, &token),
            None => self.execute_inline(task),
        }
        self.state.set(WorkerState::Idle);
    }

    fn execute_inline(&self, mut task: Task) {
        let handler = Arc::clone(&*self.fault_handler.read());
        let outcome = run_isolated(&mut task, self.id, handler.as_ref());
        self.log_outcome(&task, &outcome);
    }

    /// Run the task on a helper thread and race it against its token.
    fn execute_racing(&self, task: Task, token: &CancellationToken) {
        self.execute_racing_with(task, token, spawn_task_thread);
    }

    /// Like [`execute_racing`](Self::execute_racing) with an explicit helper
    /// thread spawner. If the helper cannot be spawned the task runs inline.
    fn execute_racing_with<S>(&self, task: Task, token: &CancellationToken, spawn: S)
    where
        S: FnOnce(String, TaskThreadBody) -> io::Result<()>,
    {
        let key = task.key().to_owned();
        let age = task.age();
        let worker_id = self.id;
        let handler = Arc::clone(&*self.fault_handler.read());
        let (task_tx, task_rx) = crossbeam_channel::bounded::<Task>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded::<Outcome>(1);

        let body: TaskThreadBody = Box::new(move || {
            if let Ok(mut task) = task_rx.recv() {
                let outcome = run_isolated(&mut task, worker_id, handler.as_ref());
                let _ = done_tx.send(outcome);
            }
        });
        if let Err(e) = spawn(format!("kq-task-{worker_id}"), body) {
            warn!(worker_id = worker_id, key = %key, error = %e, "Failed to spawn task thread, running inline");
            self.execute_inline(task);
            return;
        }
        if let Err(returned) = task_tx.send(task) {
            warn!(worker_id = worker_id, key = %key, "Task thread exited early, running inline");
            self.execute_inline(returned.into_inner());
            return;
        }

        let race = if let Some(remaining) = token.remaining() {
            select! {
                recv(done_rx) -> res => Race::Finished(res),
                recv(token.fired()) -> _ => Race::Fired(CancelReason::Cancelled),
                default(remaining) => Race::Fired(CancelReason::DeadlineExceeded),
            }
        } else {
            select! {
                recv(done_rx) -> res => Race::Finished(res),
                recv(token.fired()) -> _ => Race::Fired(CancelReason::Cancelled),
            }
        };

        match race {
            Race::Finished(Ok(outcome)) => self.log_result(&key, age, &outcome),
            Race::Finished(Err(_)) => {
                warn!(worker_id = worker_id, key = %key, "Task thread exited without reporting");
            }
            Race::Fired(reason) => {
                info!(
                    worker_id = worker_id,
                    key = %key,
                    reason = %reason,
                    "Task cancelled during execution"
                );
                if self.in_flight == InFlightCancellation::Wait {
                    // Single flight: the next task starts only after this one returns.
                    if let Ok(outcome) = done_rx.recv() {
                        self.log_result(&key, age, &outcome);
                    }
                }
            }
        }
    }

    fn log_outcome(&self, task: &Task, outcome: &Outcome) {
        self.log_result(task.key(), task.age(), outcome);
    }

    fn log_result(&self, key: &str, age: std::time::Duration, outcome: &Outcome) {
        match outcome {
            Outcome::Completed => debug!(
                worker_id = self.id,
                key = key,
                age = ?age,
                "Completed task"
            ),
            Outcome::Faulted(value) => error!(
                worker_id = self.id,
                key = key,
                fault = %value,
                "Task finished with recovered fault"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fault::LogFaultHandler;
    use crate::core::task::{Metadata, TaskContext};
    use parking_lot::Mutex;
    use std::collections::HashMap;

    fn idle_worker(in_flight: InFlightCancellation) -> Worker {
        let (_task_tx, queue) = crossbeam_channel::bounded(1);
        let (_stop_tx, stop) = crossbeam_channel::bounded(0);
        let handler: Arc<dyn FaultHandler> = Arc::new(LogFaultHandler);
        Worker::new(0, queue, stop, StateCell::new(WorkerState::Idle), Arc::new(RwLock::new(handler)), in_flight)
    }

    fn recording_task(token: &CancellationToken, seen: &Arc<Mutex<Option<(thread::ThreadId, String)>>>) -> Task {
        let seen = Arc::clone(seen);
        Task::new(
            "user:7".into(),
            Box::new(move |ctx: &TaskContext| {
                *seen.lock() = Some((thread::current().id(), ctx.key().to_owned()));
            }),
            Some(token.clone()),
            None,
            Metadata::new(),
            HashMap::new(),
        )
    }

    #[test]
    fn test_task_runs_inline_when_helper_thread_cannot_spawn() {
        let worker = idle_worker(InFlightCancellation::Detach);
        let token = CancellationToken::new();
        let seen = Arc::new(Mutex::new(None));

        worker.execute_racing_with(recording_task(&token, &seen), &token, |_, _| {
            Err(io::Error::other("thread limit reached"))
        });

        assert_eq!(*seen.lock(), Some((thread::current().id(), "user:7".to_string())));
    }

    #[test]
    fn test_task_runs_on_helper_thread_when_spawn_succeeds() {
        let worker = idle_worker(InFlightCancellation::Wait);
        let token = CancellationToken::new();
        let seen = Arc::new(Mutex::new(None));

        worker.execute_racing(recording_task(&token, &seen), &token);

        let (ran_on, key) = seen.lock().take().expect("task never ran");
        assert_ne!(ran_on, thread::current().id());
        assert_eq!(key, "user:7");
    }

    #[test]
    fn test_state_roundtrip() {
        let cell = StateCell::new(WorkerState::NotStarted);
        assert_eq!(cell.get(), WorkerState::NotStarted);
        for state in [
            WorkerState::Executing,
            WorkerState::Draining,
            WorkerState::Stopped,
            WorkerState::Idle,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }
}
