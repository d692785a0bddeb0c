//! Pool configuration structures.

use std::collections::HashMap;
use std::env;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{AppResult, Strategy};

/// Worker count used when zero is requested.
pub const DEFAULT_WORKER_COUNT: usize = 1;
/// Per-worker buffer capacity used when zero is requested.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// What a worker does when a running task's cancellation token fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InFlightCancellation {
    /// Stop waiting and move to the next task. The cancelled work keeps running
    /// in the background and may overlap the next task on the same worker.
    ///
    /// Each task carrying a cancellation token runs on its own helper thread,
    /// and nothing bounds that thread once the worker has moved on. Work that
    /// can block for long should poll `TaskContext::is_cancelled` and return
    /// when it fires; a hung task otherwise keeps its thread alive.
    #[default]
    Detach,
    /// Log the cancellation, then wait for the work to return before taking the
    /// next task. Keeps strict one-at-a-time execution per worker.
    Wait,
}

/// Pool configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of workers. Zero falls back to [`DEFAULT_WORKER_COUNT`].
    pub worker_count: usize,
    /// Bounded buffer size per worker. Zero falls back to [`DEFAULT_BUFFER_CAPACITY`].
    pub buffer_capacity: usize,
    /// Routing strategy.
    pub strategy: Strategy,
    /// Behavior when a token fires during execution.
    pub in_flight_cancellation: InFlightCancellation,
    /// Worker thread name prefix; threads are named `<prefix>-<id>`.
    pub thread_name_prefix: String,
    /// Worker thread stack size in bytes. `None` uses the platform default.
    pub thread_stack_size: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            strategy: Strategy::KeyBased,
            in_flight_cancellation: InFlightCancellation::Detach,
            thread_name_prefix: "kq-worker".into(),
            thread_stack_size: None,
        }
    }
}

impl PoolConfig {
    /// Default configuration: one worker, capacity 100, key-based routing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the per-worker buffer capacity.
    #[must_use]
    pub const fn with_buffer_capacity(mut self, buffer_capacity: usize) -> Self {
        self.buffer_capacity = buffer_capacity;
        self
    }

    /// Set the routing strategy.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the in-flight cancellation policy.
    #[must_use]
    pub const fn with_in_flight_cancellation(mut self, policy: InFlightCancellation) -> Self {
        self.in_flight_cancellation = policy;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Replace out-of-range values with safe defaults, logging each fallback.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.worker_count == 0 {
            warn!(default = DEFAULT_WORKER_COUNT, "worker_count is 0, using default");
            self.worker_count = DEFAULT_WORKER_COUNT;
        }
        if self.buffer_capacity == 0 {
            warn!(default = DEFAULT_BUFFER_CAPACITY, "buffer_capacity is 0, using default");
            self.buffer_capacity = DEFAULT_BUFFER_CAPACITY;
        }
        if self.thread_name_prefix.trim().is_empty() {
            self.thread_name_prefix = Self::default().thread_name_prefix;
        }
        self
    }

    /// Parse from JSON. Missing fields take defaults; the result is normalized.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        Ok(cfg.normalized())
    }

    /// Read configuration from `KQ_*` environment variables, loading `.env` first.
    ///
    /// Recognized: `KQ_WORKER_COUNT`, `KQ_BUFFER_CAPACITY`, `KQ_STRATEGY`,
    /// `KQ_IN_FLIGHT_CANCELLATION` (`detach` | `wait`), `KQ_THREAD_NAME_PREFIX`,
    /// `KQ_THREAD_STACK_SIZE`. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable or the cancellation policy cannot
    /// be parsed.
    pub fn from_env() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();

        if let Some(raw) = read_var("KQ_WORKER_COUNT") {
            cfg.worker_count = raw.parse::<usize>().with_context(|| format!("invalid KQ_WORKER_COUNT `{raw}`"))?;
        }
        if let Some(raw) = read_var("KQ_BUFFER_CAPACITY") {
            cfg.buffer_capacity = raw.parse::<usize>().with_context(|| format!("invalid KQ_BUFFER_CAPACITY `{raw}`"))?;
        }
        if let Some(raw) = read_var("KQ_STRATEGY") {
            cfg.strategy = Strategy::parse(&raw);
        }
        if let Some(raw) = read_var("KQ_IN_FLIGHT_CANCELLATION") {
            cfg.in_flight_cancellation = serde_json::from_value(serde_json::Value::String(raw.to_ascii_lowercase()))
                .with_context(|| format!("invalid KQ_IN_FLIGHT_CANCELLATION `{raw}`"))?;
        }
        if let Some(raw) = read_var("KQ_THREAD_NAME_PREFIX") {
            cfg.thread_name_prefix = raw;
        }
        if let Some(raw) = read_var("KQ_THREAD_STACK_SIZE") {
            cfg.thread_stack_size = Some(raw.parse::<usize>().with_context(|| format!("invalid KQ_THREAD_STACK_SIZE `{raw}`"))?);
        }

        Ok(cfg.normalized())
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

/// Named pool configurations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueuesConfig {
    /// Map of pool name to configuration.
    pub pools: HashMap<String, PoolConfig>,
}

impl QueuesConfig {
    /// Ensure at least one pool exists and every name is non-empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.pools.is_empty() {
            return Err("at least one pool must be defined".into());
        }
        if self.pools.keys().any(|name| name.trim().is_empty()) {
            return Err("pool names must not be empty".into());
        }
        Ok(())
    }

    /// Parse from JSON, normalize every pool and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let mut cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.pools = cfg
            .pools
            .into_iter()
            .map(|(name, pool)| (name, pool.normalized()))
            .collect();
        cfg.validate()?;
        Ok(cfg)
    }
}
