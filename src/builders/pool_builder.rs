//! Builders to construct keyed pools from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;

use crate::config::{PoolConfig, QueuesConfig};
use crate::core::{AppResult, FaultHandler, KeyedPool, LogFaultHandler};

/// Named builder for a single [`KeyedPool`].
pub struct PoolBuilder {
    name: String,
    config: PoolConfig,
    fault_handler: Arc<dyn FaultHandler>,
}

impl PoolBuilder {
    /// Start from a name and configuration, with the logging fault handler.
    #[must_use]
    pub fn new(name: impl Into<String>, config: PoolConfig) -> Self {
        Self {
            name: name.into(),
            config,
            fault_handler: Arc::new(LogFaultHandler),
        }
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration as given (not yet normalized).
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Use `handler` for recovered faults.
    #[must_use]
    pub fn fault_handler<H: FaultHandler>(mut self, handler: H) -> Self {
        self.fault_handler = Arc::new(handler);
        self
    }

    /// Build the pool. Workers are created but not started.
    #[must_use]
    pub fn build(self) -> KeyedPool {
        let config = if self.config.thread_name_prefix == PoolConfig::default().thread_name_prefix {
            // Distinguish pools in thread listings.
            self.config.with_thread_name_prefix(format!("kq-{}", self.name))
        } else {
            self.config
        };
        KeyedPool::with_fault_handler(config, self.fault_handler)
    }
}

/// Build one pool per entry in `cfg`, each with the logging fault handler.
///
/// # Errors
///
/// Returns an error if the configuration fails validation.
pub fn build_pools(cfg: &QueuesConfig) -> AppResult<HashMap<String, KeyedPool>> {
    cfg.validate().map_err(|e| anyhow!("config invalid: {e}"))?;

    Ok(cfg
        .pools
        .iter()
        .map(|(name, pool_cfg)| (name.clone(), PoolBuilder::new(name.as_str(), pool_cfg.clone()).build()))
        .collect())
}
