//! Cross-thread change notification.
//!
//! A [`Notifier`] pairs a provider lock and condition with a change counter.
//! Producers call [`notify`](Notifier::notify) after mutating shared state;
//! consumers remember the counter they last saw and block in
//! [`wait_for_change`](Notifier::wait_for_change) until it moves.

use crate::error::Result;
use crate::threading::condition::{Condition, WaitOutcome};
use crate::threading::lock::Lock;
use crate::tracing_compat::trace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A shared structure that can carry a [`Notifier`].
///
/// Attach with [`Threading::make_notifiable`](crate::threading::Threading::make_notifiable).
pub trait Notifiable {
    /// Returns the attached notifier, if any.
    fn notifier(&self) -> Option<&Notifier>;

    /// Stores `notifier`. Called at most once per structure by
    /// `make_notifiable`; a structure that already has one keeps it.
    fn attach_notifier(&self, notifier: Notifier) -> Result<()>;
}

/// Lock, condition and change counter used to wake blocked consumers.
#[derive(Debug)]
pub struct Notifier {
    lock: Lock,
    condition: Condition,
    sequence: AtomicU64,
}

impl Notifier {
    pub(crate) const fn new(lock: Lock, condition: Condition) -> Self {
        Self {
            lock,
            condition,
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the current change counter.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Bumps the change counter and wakes every waiter.
    pub fn notify(&self) -> Result<()> {
        let _guard = self.lock.acquire()?;
        let seq = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(sequence = seq, "notifier signalled");
        self.condition.broadcast()
    }

    /// Blocks until the counter differs from `seen` or `timeout` elapses.
    ///
    /// Returns `Signalled` immediately if the counter has already moved.
    pub fn wait_for_change(&self, seen: u64, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let _guard = self.lock.acquire()?;
        loop {
            if self.sequence.load(Ordering::Acquire) != seen {
                return Ok(WaitOutcome::Signalled);
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(WaitOutcome::TimedOut);
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            self.condition.wait(&self.lock, remaining)?;
        }
    }
}
