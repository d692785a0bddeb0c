//! Broadcast-once cancellation handle shared between a caller and a task.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

/// Why a [`CancellationToken`] counts as fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CancellationToken::cancel`] was called.
    Cancelled,
    /// The token's deadline passed.
    DeadlineExceeded,
}

const LIVE: u8 = 0;
const CANCELLED: u8 = 1;

struct TokenInner {
    state: AtomicU8,
    deadline: Option<Instant>,
    /// Dropped on cancel; every clone of `fired` then observes disconnection.
    trigger: Mutex<Option<Sender<()>>>,
    fired: Receiver<()>,
}

/// Cloneable cancellation handle, optionally bounded by a deadline.
///
/// All clones share one state: cancelling any of them cancels all. Once the
/// deadline passes the token reports [`CancelReason::DeadlineExceeded`] without
/// anyone calling [`cancel`](Self::cancel).
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Create a live token with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a token that fires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(deadline))
    }

    /// Create a token that fires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::build(Instant::now().checked_add(timeout))
    }

    fn build(deadline: Option<Instant>) -> Self {
        let (trigger, fired) = bounded(0);
        Self {
            inner: Arc::new(TokenInner {
                state: AtomicU8::new(LIVE),
                deadline,
                trigger: Mutex::new(Some(trigger)),
                fired,
            }),
        }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        self.inner.state.store(CANCELLED, Ordering::Release);
        self.inner.trigger.lock().take();
    }

    /// Whether the token was cancelled or its deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Reason the token fired, or `None` while it is live.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        if self.inner.state.load(Ordering::Acquire) == CANCELLED {
            return Some(CancelReason::Cancelled);
        }
        match self.inner.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Deadline attached to the token, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Time left until the deadline; zero once it has passed.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Channel that disconnects when [`cancel`](Self::cancel) is called.
    ///
    /// Deadlines are not signalled here; callers waiting on it must also bound
    /// the wait by [`remaining`](Self::remaining).
    pub(crate) fn fired(&self) -> &Receiver<()> {
        &self.inner.fired
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("reason", &self.reason())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::DeadlineExceeded => write!(f, "deadline exceeded"),
        }
    }
}
