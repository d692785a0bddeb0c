//! Tests for builder modules

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use prometheus_keyed_queue::builders::{build_pools, PoolBuilder};
use prometheus_keyed_queue::config::{PoolConfig, QueuesConfig};
use prometheus_keyed_queue::core::{Fault, Strategy, Task};

#[test]
fn test_pool_builder_accessors() {
    let config = PoolConfig::new().with_worker_count(3).with_buffer_capacity(50);
    let builder = PoolBuilder::new("orders", config);
    assert_eq!(builder.name(), "orders");
    assert_eq!(builder.config().worker_count, 3);
    assert_eq!(builder.config().buffer_capacity, 50);
}

#[test]
fn test_pool_builder_names_threads_after_pool() {
    let pool = PoolBuilder::new("orders", PoolConfig::new()).build();
    assert_eq!(pool.config().thread_name_prefix, "kq-orders");

    let pool = PoolBuilder::new("orders", PoolConfig::new().with_thread_name_prefix("custom")).build();
    assert_eq!(pool.config().thread_name_prefix, "custom");
}

#[test]
fn test_pool_builder_fault_handler_is_used() {
    let faults = Arc::new(AtomicUsize::new(0));
    let faults_clone = Arc::clone(&faults);
    let pool = PoolBuilder::new("faulty", PoolConfig::new())
        .fault_handler(move |_: &Task, _: &Fault| {
            faults_clone.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    pool.start().unwrap();
    pool.enqueue("k", |_| panic!("boom")).unwrap();
    pool.stop();
    assert_eq!(faults.load(Ordering::SeqCst), 1);
}

#[test]
fn test_build_pools_from_config() {
    let cfg = QueuesConfig::from_json_str(
        r#"{"pools": {"a": {"worker_count": 2}, "b": {"strategy": "round_robin"}}}"#,
    )
    .unwrap();
    let pools = build_pools(&cfg).unwrap();
    assert_eq!(pools.len(), 2);
    assert_eq!(pools["a"].size(), 2);
    assert_eq!(pools["b"].strategy(), Strategy::RoundRobin);
    assert!(pools.values().all(|p| !p.is_running()));
}

#[test]
fn test_build_pools_rejects_empty_config() {
    assert!(build_pools(&QueuesConfig::default()).is_err());
}
