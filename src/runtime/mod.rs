//! Runtime adapters: wiring external shutdown triggers to a pool.

pub mod shutdown;

#[cfg(feature = "tokio-runtime")]
pub use shutdown::stop_on_shutdown_signal;
pub use shutdown::watch_shutdown;
