//! Tests for configuration parsing and normalization

use prometheus_keyed_queue::config::{InFlightCancellation, PoolConfig, QueuesConfig};
use prometheus_keyed_queue::core::Strategy;

#[test]
fn test_pool_config_defaults() {
    let cfg = PoolConfig::default();
    assert_eq!(cfg.worker_count, 1);
    assert_eq!(cfg.buffer_capacity, 100);
    assert_eq!(cfg.strategy, Strategy::KeyBased);
    assert_eq!(cfg.in_flight_cancellation, InFlightCancellation::Detach);
    assert_eq!(cfg.thread_stack_size, None);
}

#[test]
fn test_pool_config_builder() {
    let cfg = PoolConfig::new()
        .with_worker_count(8)
        .with_buffer_capacity(500)
        .with_strategy(Strategy::RoundRobin)
        .with_in_flight_cancellation(InFlightCancellation::Wait)
        .with_thread_stack_size(4 * 1024 * 1024);
    assert_eq!(cfg.worker_count, 8);
    assert_eq!(cfg.buffer_capacity, 500);
    assert_eq!(cfg.strategy, Strategy::RoundRobin);
    assert_eq!(cfg.in_flight_cancellation, InFlightCancellation::Wait);
    assert_eq!(cfg.thread_stack_size, Some(4 * 1024 * 1024));
}

#[test]
fn test_pool_config_zero_values_normalized() {
    let cfg = PoolConfig::from_json_str(r#"{"worker_count": 0, "buffer_capacity": 0}"#).unwrap();
    assert_eq!(cfg.worker_count, 1);
    assert_eq!(cfg.buffer_capacity, 100);
}

#[test]
fn test_pool_config_unknown_strategy_falls_back() {
    let cfg = PoolConfig::from_json_str(r#"{"strategy": "least_loaded"}"#).unwrap();
    assert_eq!(cfg.strategy, Strategy::KeyBased);
}

#[test]
fn test_pool_config_malformed_json() {
    assert!(PoolConfig::from_json_str("{not json").is_err());
}

#[test]
fn test_queues_config_validation() {
    let json = r#"{
        "pools": {
            "orders": { "worker_count": 4, "buffer_capacity": 50, "strategy": "key_based" },
            "emails": { "worker_count": 2, "strategy": "round_robin" }
        }
    }"#;

    let cfg = QueuesConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.pools.len(), 2);
    assert_eq!(cfg.pools["orders"].worker_count, 4);
    assert_eq!(cfg.pools["emails"].buffer_capacity, 100);
    assert_eq!(cfg.pools["emails"].strategy, Strategy::RoundRobin);
}

#[test]
fn test_queues_config_empty_pools() {
    assert!(QueuesConfig::default().validate().is_err());
    assert!(QueuesConfig::from_json_str(r#"{"pools": {}}"#).is_err());
}

#[test]
fn test_pool_config_json_roundtrip_keeps_strategy_name() {
    let cfg = PoolConfig::new().with_strategy(Strategy::RoundRobin);
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(json.contains("\"round_robin\""));
    assert_eq!(PoolConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_pool_config_from_env() {
    std::env::set_var("KQ_WORKER_COUNT", "6");
    std::env::set_var("KQ_STRATEGY", "round-robin");
    std::env::set_var("KQ_IN_FLIGHT_CANCELLATION", "WAIT");
    let cfg = PoolConfig::from_env().unwrap();
    assert_eq!(cfg.worker_count, 6);
    assert_eq!(cfg.strategy, Strategy::RoundRobin);
    assert_eq!(cfg.in_flight_cancellation, InFlightCancellation::Wait);

    std::env::set_var("KQ_WORKER_COUNT", "many");
    assert!(PoolConfig::from_env().is_err());

    for name in ["KQ_WORKER_COUNT", "KQ_STRATEGY", "KQ_IN_FLIGHT_CANCELLATION"] {
        std::env::remove_var(name);
    }
}
