//! Task data model and the context handed to a running unit of work.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;
use uuid::Uuid;

use super::cancel::CancellationToken;

/// Caller-supplied diagnostic context attached to a task.
pub type Metadata = HashMap<String, Value>;

/// The unit of work carried by a task.
pub type Work = Box<dyn FnOnce(&TaskContext) + Send + 'static>;

/// Metadata key set to `true` when a fault was recovered.
pub const FAULT_RECOVERED: &str = "fault_recovered";
/// Metadata key holding the fault value rendered as text.
pub const FAULT_VALUE: &str = "fault_value";
/// Metadata key holding the fault time in unix milliseconds.
pub const FAULT_TIME: &str = "fault_time";
/// Metadata key holding the id of the worker that recovered the fault.
pub const WORKER_ID: &str = "worker_id";
/// Metadata key holding the captured stack trace.
pub const STACK_TRACE: &str = "stack_trace";

/// Metadata keys written by the engine on fault. Callers cannot seed them.
pub const RESERVED_METADATA_KEYS: [&str; 5] =
    [FAULT_RECOVERED, FAULT_VALUE, FAULT_TIME, WORKER_ID, STACK_TRACE];

/// A unit of work routed by key.
///
/// The key, id and admission time are fixed once the task is built. Metadata
/// only ever grows: the engine adds fault diagnostics but never removes or
/// overwrites caller entries.
pub struct Task {
    id: Uuid,
    key: String,
    work: Option<Work>,
    cancellation: Option<CancellationToken>,
    expire_at: Option<Instant>,
    enqueued_at: Instant,
    metadata: Metadata,
    context_values: HashMap<String, Value>,
}

impl Task {
    pub(crate) fn new(
        key: String,
        work: Work,
        cancellation: Option<CancellationToken>,
        expire_at: Option<Instant>,
        metadata: Metadata,
        context_values: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            work: Some(work),
            cancellation,
            expire_at,
            enqueued_at: Instant::now(),
            metadata,
            context_values,
        }
    }

    /// Unique id assigned at admission.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Routing key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Metadata bag, including fault diagnostics once a fault was recovered.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Cancellation token supplied at submission, if any.
    #[must_use]
    pub const fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Expiration time, if any.
    #[must_use]
    pub const fn expire_at(&self) -> Option<Instant> {
        self.expire_at
    }

    /// Admission time.
    #[must_use]
    pub const fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    /// Time elapsed since admission.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.enqueued_at.elapsed()
    }

    /// Whether the expiration time has been reached.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expire_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Whether the cancellation token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub(crate) fn take_work(&mut self) -> Option<Work> {
        self.work.take()
    }

    pub(crate) fn record_fault(&mut self, worker_id: usize, value: &str, at_ms: u128, stack: &str) {
        self.metadata.insert(FAULT_RECOVERED.into(), Value::Bool(true));
        self.metadata.insert(FAULT_VALUE.into(), Value::String(value.to_owned()));
        self.metadata.insert(FAULT_TIME.into(), Value::from(u64::try_from(at_ms).unwrap_or(u64::MAX)));
        self.metadata.insert(WORKER_ID.into(), Value::from(worker_id));
        self.metadata.insert(STACK_TRACE.into(), Value::String(stack.to_owned()));
    }

    /// Build the context for one invocation, projecting metadata and caller
    /// values into their own namespaces.
    pub(crate) fn context(&self, worker_id: usize) -> TaskContext {
        let mut values = HashMap::with_capacity(self.metadata.len() + self.context_values.len());
        for (name, value) in &self.metadata {
            values.insert(ContextKey::metadata(name), value.clone());
        }
        for (name, value) in &self.context_values {
            values.insert(ContextKey::value(name), value.clone());
        }
        TaskContext {
            task_id: self.id,
            key: self.key.clone(),
            worker_id,
            cancellation: self.cancellation.clone(),
            values,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("expire_at", &self.expire_at)
            .field("enqueued_at", &self.enqueued_at)
            .field("cancellation", &self.cancellation)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Namespace {
    Metadata,
    Value,
}

/// Namespaced lookup key for values visible through a [`TaskContext`].
///
/// Metadata entries and arbitrary caller values live in separate namespaces,
/// so a caller value named like a metadata entry never shadows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    namespace: Namespace,
    name: String,
}

impl ContextKey {
    /// Key for a projected metadata entry.
    #[must_use]
    pub fn metadata(name: &str) -> Self {
        Self { namespace: Namespace::Metadata, name: name.to_owned() }
    }

    /// Key for an arbitrary caller-supplied context value.
    #[must_use]
    pub fn value(name: &str) -> Self {
        Self { namespace: Namespace::Value, name: name.to_owned() }
    }

    /// Name without its namespace.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace {
            Namespace::Metadata => write!(f, "metadata:{}", self.name),
            Namespace::Value => write!(f, "value:{}", self.name),
        }
    }
}

/// Handle passed to a unit of work while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task_id: Uuid,
    key: String,
    worker_id: usize,
    cancellation: Option<CancellationToken>,
    values: HashMap<ContextKey, Value>,
}

impl TaskContext {
    /// Id of the task being executed.
    #[must_use]
    pub const fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Routing key of the task.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Worker executing the task.
    #[must_use]
    pub const fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Cancellation token attached to the task, if any.
    #[must_use]
    pub const fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Whether the task's token has fired. Long-running work should poll this.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Metadata entry as it was when execution began.
    #[must_use]
    pub fn metadata(&self, name: &str) -> Option<&Value> {
        self.get(&ContextKey::metadata(name))
    }

    /// Caller-supplied context value.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(&ContextKey::value(name))
    }

    /// Raw lookup by namespaced key.
    #[must_use]
    pub fn get(&self, key: &ContextKey) -> Option<&Value> {
        self.values.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_task(metadata: Metadata, values: HashMap<String, Value>) -> Task {
        Task::new("user:1".into(), Box::new(|_| {}), None, None, metadata, values)
    }

    #[test]
    fn test_context_namespaces_do_not_collide() {
        let metadata = Metadata::from([("tenant".to_string(), json!("acme"))]);
        let values = HashMap::from([("tenant".to_string(), json!("other"))]);
        let task = make_task(metadata, values);

        let ctx = task.context(3);
        assert_eq!(ctx.worker_id(), 3);
        assert_eq!(ctx.key(), "user:1");
        assert_eq!(ctx.metadata("tenant"), Some(&json!("acme")));
        assert_eq!(ctx.value("tenant"), Some(&json!("other")));
        assert_eq!(ctx.metadata("missing"), None);
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_record_fault_keeps_caller_entries() {
        let metadata = Metadata::from([("order".to_string(), json!(42))]);
        let mut task = make_task(metadata, HashMap::new());

        task.record_fault(1, "boom", 1_700_000_000_000, "trace");

        let meta = task.metadata();
        assert_eq!(meta.get("order"), Some(&json!(42)));
        assert_eq!(meta.get(FAULT_RECOVERED), Some(&json!(true)));
        assert_eq!(meta.get(FAULT_VALUE), Some(&json!("boom")));
        assert_eq!(meta.get(WORKER_ID), Some(&json!(1)));
        assert_eq!(meta.get(STACK_TRACE), Some(&json!("trace")));
    }

    #[test]
    fn test_expiry_and_cancellation_checks() {
        let token = CancellationToken::new();
        let task = Task::new(
            "k".into(),
            Box::new(|_| {}),
            Some(token.clone()),
            Some(Instant::now()),
            Metadata::new(),
            HashMap::new(),
        );
        assert!(task.is_expired());
        assert!(!task.is_cancelled());
        token.cancel();
        assert!(task.is_cancelled());
        assert_eq!(ContextKey::metadata("a").to_string(), "metadata:a");
    }
}
