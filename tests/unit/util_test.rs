//! Tests for utility functions

use prometheus_keyed_queue::util::{filter_directive, murmur3_32, now_ms};

#[test]
fn test_murmur3_is_deterministic() {
    assert_eq!(murmur3_32(b"user:123", 0), murmur3_32(b"user:123", 0));
    assert_ne!(murmur3_32(b"user:123", 0), murmur3_32(b"user:124", 0));
}

#[test]
fn test_now_ms_is_after_2020() {
    assert!(now_ms() > 1_577_836_800_000);
}

#[test]
fn test_log_level_names() {
    assert_eq!(filter_directive("error"), "error");
    assert_eq!(filter_directive(" Info "), "info");
    assert_eq!(filter_directive("off"), "off");
}

#[test]
fn test_init_tracing_is_idempotent() {
    prometheus_keyed_queue::util::init_tracing();
    prometheus_keyed_queue::util::init_tracing_with_level("debug");
}
