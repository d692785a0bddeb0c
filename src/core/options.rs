//! Optional submission settings for [`KeyedPool::enqueue_with`](super::KeyedPool::enqueue_with).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::warn;

use super::cancel::CancellationToken;
use super::task::{Metadata, RESERVED_METADATA_KEYS};

/// Builder for the optional fields of a task.
///
/// ```rust,ignore
/// let opts = EnqueueOptions::new()
///     .with_timeout(Duration::from_secs(5))
///     .with_metadata_entry("tenant", json!("acme"));
/// pool.enqueue_with("order:456", |ctx| handle(ctx), opts)?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct EnqueueOptions {
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) expire_at: Option<Instant>,
    pub(crate) metadata: Metadata,
    pub(crate) context_values: HashMap<String, Value>,
}

impl EnqueueOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire the task `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        // An unrepresentable instant is treated as "never expires".
        self.expire_at = Instant::now().checked_add(timeout);
        self
    }

    /// Expire the task at an absolute instant.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.expire_at = Some(deadline);
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Seed the metadata bag. Entries merge with earlier ones.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        for (name, value) in metadata {
            self = self.with_metadata_entry(name, value);
        }
        self
    }

    /// Add one metadata entry. Reserved fault keys are dropped.
    #[must_use]
    pub fn with_metadata_entry(mut self, name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        if RESERVED_METADATA_KEYS.contains(&name.as_str()) {
            warn!(key = %name, "Ignoring reserved metadata key");
            return self;
        }
        self.metadata.insert(name, value);
        self
    }

    /// Add an arbitrary value readable through `TaskContext::value`.
    #[must_use]
    pub fn with_context_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.context_values.insert(name.into(), value);
        self
    }

    /// Whether the options already describe an expired task.
    pub(crate) fn is_expired(&self) -> bool {
        self.expire_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Whether the attached token already fired.
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}
