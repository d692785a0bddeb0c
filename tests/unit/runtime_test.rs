//! Tests for runtime adapters

use crossbeam_channel::bounded;
use prometheus_keyed_queue::core::{KeyedPool, Strategy};
use prometheus_keyed_queue::runtime::watch_shutdown;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_shutdown_trigger_drains_before_stopping() {
    let pool = KeyedPool::new(2, 64, Strategy::KeyBased);
    pool.start().unwrap();
    let executed = Arc::new(AtomicUsize::new(0));
    for i in 0..50 {
        let executed = Arc::clone(&executed);
        pool.enqueue(format!("user:{i}"), move |_| {
            executed.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    let (trigger, rx) = bounded(1);
    let watcher = watch_shutdown(&pool, rx).unwrap();
    trigger.send(()).unwrap();
    watcher.join().unwrap();

    assert!(!pool.is_running());
    assert_eq!(executed.load(Ordering::SeqCst), 50);
}

#[tokio::test]
async fn test_stop_is_safe_from_async_context() {
    let pool = KeyedPool::new(1, 8, Strategy::KeyBased);
    pool.start().unwrap();
    pool.enqueue("k", |_| {}).unwrap();

    let handle = pool.clone();
    tokio::task::spawn_blocking(move || handle.stop()).await.unwrap();
    assert!(!pool.is_running());
}
