//! Fault isolation around a single task invocation.

use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, error};

use super::task::Task;
use crate::util::clock::now_ms;

/// A panic recovered while running a unit of work.
#[derive(Debug, Clone)]
pub struct Fault {
    /// Panic payload rendered as text.
    pub value: String,
    /// Stack trace captured at the isolation boundary.
    pub stack_trace: String,
    /// Worker that recovered the fault.
    pub worker_id: usize,
    /// Recovery time in unix milliseconds.
    pub at_ms: u128,
}

/// Callback invoked once per recovered fault.
///
/// Runs on the thread that executed the task, after the fault diagnostics have
/// been written to the task's metadata. Closures of the right shape implement
/// this trait.
pub trait FaultHandler: Send + Sync + 'static {
    /// Handle a recovered fault.
    fn on_fault(&self, task: &Task, fault: &Fault);
}

impl<F> FaultHandler for F
where
    F: Fn(&Task, &Fault) + Send + Sync + 'static,
{
    fn on_fault(&self, task: &Task, fault: &Fault) {
        self(task, fault);
    }
}

/// Default handler: logs the fault and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFaultHandler;

impl FaultHandler for LogFaultHandler {
    fn on_fault(&self, task: &Task, fault: &Fault) {
        error!(
            worker_id = fault.worker_id,
            key = task.key(),
            task_id = %task.id(),
            fault = %fault.value,
            "Task fault recovered"
        );
    }
}

/// Result of one isolated invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The work returned normally.
    Completed,
    /// The work panicked; carries the rendered panic value.
    Faulted(String),
}

/// Run the task's work, containing any panic at this boundary.
///
/// Metadata is projected into the context immediately before the call. On a
/// panic the diagnostics are written to the task and `handler` is invoked; a
/// panicking handler is contained as well.
pub(crate) fn run_isolated(task: &mut Task, worker_id: usize, handler: &dyn FaultHandler) -> Outcome {
    let Some(work) = task.take_work() else {
        return Outcome::Completed;
    };

    debug!(worker_id = worker_id, key = task.key(), "Executing task");
    let ctx = task.context(worker_id);

    match catch_unwind(AssertUnwindSafe(|| work(&ctx))) {
        Ok(()) => Outcome::Completed,
        Err(payload) => {
            let fault = Fault {
                value: panic_message(payload.as_ref()),
                stack_trace: Backtrace::force_capture().to_string(),
                worker_id,
                at_ms: now_ms(),
            };
            error!(
                worker_id = worker_id,
                key = task.key(),
                fault = %fault.value,
                "Panic recovered while executing task"
            );
            debug!(
                worker_id = worker_id,
                key = task.key(),
                stack_trace = %fault.stack_trace,
                "Fault stack trace"
            );
            task.record_fault(worker_id, &fault.value, fault.at_ms, &fault.stack_trace);

            if catch_unwind(AssertUnwindSafe(|| handler.on_fault(task, &fault))).is_err() {
                error!(worker_id = worker_id, key = task.key(), "Fault handler panicked");
            }
            Outcome::Faulted(fault.value)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}
