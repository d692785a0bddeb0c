//! Routing strategies mapping a task to a worker index.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::util::hash::murmur3_32;

/// How tasks are assigned to workers.
///
/// | Strategy     | Same key, same worker | Even load |
/// |--------------|-----------------------|-----------|
/// | `KeyBased`   | yes (ordered per key) | by key distribution |
/// | `RoundRobin` | **no**                | yes       |
///
/// `RoundRobin` ignores the key entirely, so tasks sharing a key may run on
/// different workers concurrently and in any order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Strategy {
    /// Hash the key; equal keys always land on the same worker.
    #[default]
    KeyBased,
    /// Rotate through workers regardless of key.
    RoundRobin,
}

impl Strategy {
    /// Parse a strategy name. Unknown names fall back to `KeyBased` with a warning.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "key_based" | "keybased" | "key" | "hash" => Self::KeyBased,
            "round_robin" | "roundrobin" => Self::RoundRobin,
            other => {
                warn!(strategy = other, "Unknown routing strategy, defaulting to key_based");
                Self::KeyBased
            }
        }
    }

    /// Stable name used in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeyBased => "key_based",
            Self::RoundRobin => "round_robin",
        }
    }

    /// Worker index for `key` given the submission `sequence` number.
    ///
    /// Pure: `KeyBased` depends only on `key` and `pool_size`, `RoundRobin` only on
    /// `sequence` and `pool_size`. `pool_size` must be non-zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn route(self, key: &str, sequence: u64, pool_size: usize) -> usize {
        debug_assert!(pool_size > 0, "pool_size must be non-zero");
        match self {
            Self::KeyBased => murmur3_32(key.as_bytes(), 0) as usize % pool_size,
            // The remainder is below pool_size, so it fits in usize.
            Self::RoundRobin => (sequence % pool_size as u64) as usize,
        }
    }
}

impl From<String> for Strategy {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<&str> for Strategy {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl From<Strategy> for String {
    fn from(strategy: Strategy) -> Self {
        strategy.as_str().to_owned()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A strategy bound to its round-robin sequence counter.
#[derive(Debug)]
pub(crate) struct Router {
    strategy: Strategy,
    sequence: AtomicU64,
}

impl Router {
    pub(crate) const fn new(strategy: Strategy) -> Self {
        Self { strategy, sequence: AtomicU64::new(0) }
    }

    pub(crate) const fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub(crate) fn route(&self, key: &str, pool_size: usize) -> usize {
        let sequence = match self.strategy {
            Strategy::RoundRobin => self.sequence.fetch_add(1, Ordering::Relaxed),
            Strategy::KeyBased => 0,
        };
        self.strategy.route(key, sequence, pool_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_based_is_stable() {
        for key in ["user:1", "order:456", "", "a"] {
            let first = Strategy::KeyBased.route(key, 0, 7);
            for seq in 1..20 {
                assert_eq!(Strategy::KeyBased.route(key, seq, 7), first);
            }
            assert!(first < 7);
        }
        // Matches MurmurHash3 reduction for a two-worker pool.
        assert_eq!(Strategy::KeyBased.route("a", 0, 2), 0);
        assert_eq!(Strategy::KeyBased.route("b", 0, 2), 1);
    }

    #[test]
    fn test_round_robin_is_even() {
        let router = Router::new(Strategy::RoundRobin);
        let mut counts = [0usize; 3];
        for _ in 0..10 {
            counts[router.route("same-key", 3)] += 1;
        }
        assert_eq!(counts, [4, 3, 3]);
    }

    #[test]
    fn test_parse_falls_back_to_key_based() {
        assert_eq!(Strategy::parse("round-robin"), Strategy::RoundRobin);
        assert_eq!(Strategy::parse("KEY_BASED"), Strategy::KeyBased);
        assert_eq!(Strategy::parse("random"), Strategy::KeyBased);
    }

    #[test]
    fn test_serde_is_lenient() {
        let s: Strategy = serde_json::from_str("\"round_robin\"").unwrap();
        assert_eq!(s, Strategy::RoundRobin);
        let s: Strategy = serde_json::from_str("\"least_loaded\"").unwrap();
        assert_eq!(s, Strategy::KeyBased);
        assert_eq!(serde_json::to_string(&Strategy::RoundRobin).unwrap(), "\"round_robin\"");
    }
}
