//! Exactly-once completion values and caller cancellation context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::LocalError;

/// Upper bound on a single condvar wait while a [`CallContext`] is being watched.
const CONTEXT_CHECK_INTERVAL: Duration = Duration::from_millis(50);

struct Inner<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

/// A value that is completed exactly once and can be awaited from any thread.
///
/// The first [`complete`](Promise::complete) wins; later calls return `false`
/// and leave the stored value untouched. Clones share the same value.
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("done", &self.is_done())
            .finish()
    }
}

impl<T> Promise<T> {
    /// Create an unresolved promise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(None),
                ready: Condvar::new(),
            }),
        }
    }

    /// Create a promise that is already resolved.
    pub fn completed(value: T) -> Self {
        let promise = Self::new();
        promise.complete(value);
        promise
    }

    /// Resolve the promise. Returns `false` if it was already resolved.
    pub fn complete(&self, value: T) -> bool {
        let mut slot = self.inner.value.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(value);
        drop(slot);
        self.inner.ready.notify_all();
        true
    }

    /// Returns true once the promise has been resolved.
    pub fn is_done(&self) -> bool {
        self.inner.value.lock().is_some()
    }
}

impl<T: Clone> Promise<T> {
    /// Non-blocking read of the resolved value.
    pub fn get(&self) -> Option<T> {
        self.inner.value.lock().clone()
    }

    /// Block until resolved or until `timeout` elapses.
    pub fn join(&self, timeout: Duration) -> Result<T, LocalError> {
        self.join_in(&CallContext::new(), timeout)
    }

    /// Block until resolved, `timeout` elapses, or `ctx` is cancelled or expires.
    ///
    /// A context that already fired is reported as
    /// [`LocalError::Cancelled`] / [`LocalError::DeadlineExceeded`] rather than
    /// as a plain timeout.
    pub fn join_in(&self, ctx: &CallContext, timeout: Duration) -> Result<T, LocalError> {
        let started = Instant::now();
        let mut slot = self.inner.value.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return Ok(value.clone());
            }
            ctx.check()?;

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(LocalError::Timeout(timeout));
            }
            let wait = (timeout - elapsed).min(CONTEXT_CHECK_INTERVAL);
            self.inner.ready.wait_for(&mut slot, wait);
        }
    }
}

/// Caller-side deadline and cancellation for one logical operation.
///
/// Clones share the cancellation flag, so a context handed to another thread
/// can cancel the operation that is blocked on it.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl CallContext {
    /// Context without a deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose deadline is `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Derive a context sharing this one's cancellation flag, with a new deadline.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        Self {
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Request cancellation of everything sharing this context.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Returns true if the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail if the context has been cancelled or has expired.
    pub fn check(&self) -> Result<(), LocalError> {
        if self.is_expired() {
            return Err(LocalError::DeadlineExceeded);
        }
        if self.is_cancelled() {
            return Err(LocalError::Cancelled);
        }
        Ok(())
    }
}
