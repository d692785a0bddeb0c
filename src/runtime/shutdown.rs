//! Shutdown trigger wiring.
//!
//! The pool itself never installs signal handlers. Callers pick a trigger and
//! hand it a pool; when the trigger fires the pool is stopped once.

use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::{debug, info};

use crate::core::KeyedPool;

/// Stop `pool` when `trigger` receives a message or disconnects.
///
/// The watcher thread holds only a weak reference, so it does not keep a
/// dropped pool alive.
///
/// # Errors
///
/// Returns the I/O error if the watcher thread cannot be spawned.
pub fn watch_shutdown(pool: &KeyedPool, trigger: Receiver<()>) -> std::io::Result<JoinHandle<()>> {
    let pool = pool.downgrade();
    thread::Builder::new()
        .name("kq-shutdown".into())
        .spawn(move || {
            let _ = trigger.recv();
            match pool.upgrade() {
                Some(inner) => {
                    info!("Received shutdown trigger, starting graceful shutdown");
                    inner.stop();
                }
                None => debug!("Shutdown trigger fired after pool was dropped"),
            }
        })
}

/// Wait for Ctrl-C (or SIGTERM on unix), then stop `pool` on the blocking
/// thread pool.
///
/// # Errors
///
/// Returns an error if a signal handler cannot be installed or the blocking
/// stop task fails to join.
#[cfg(feature = "tokio-runtime")]
pub async fn stop_on_shutdown_signal(pool: KeyedPool) -> std::io::Result<()> {
    let signals = ShutdownSignals::install()?;
    stop_on_signals(pool, signals).await
}

#[cfg(feature = "tokio-runtime")]
async fn stop_on_signals(pool: KeyedPool, mut signals: ShutdownSignals) -> std::io::Result<()> {
    let signal = signals.recv().await?;
    info!(signal = signal, "Received shutdown signal, starting graceful shutdown");
    tokio::task::spawn_blocking(move || pool.stop())
        .await
        .map_err(std::io::Error::other)
}

/// Process signals that request a graceful shutdown.
#[cfg(feature = "tokio-runtime")]
struct ShutdownSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

#[cfg(feature = "tokio-runtime")]
impl ShutdownSignals {
    /// Register the handlers. Must be called inside a tokio runtime.
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?,
        })
    }

    /// Name of the first signal received.
    #[cfg(unix)]
    async fn recv(&mut self) -> std::io::Result<&'static str> {
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    #[allow(clippy::unused_self)]
    async fn recv(&mut self) -> std::io::Result<&'static str> {
        tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
    }
}
