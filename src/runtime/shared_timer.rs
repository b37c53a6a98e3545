//! Timer queue shared between threads.
//!
//! [`SharedTimerQueue`] is a [`TimerQueue`] behind one provider lock. Once
//! made notifiable it also wakes blocked consumers whenever the earliest
//! deadline changes, which is what a dispatch loop sleeping until the next
//! timer needs to hear about.

use crate::error::{Error, Result};
use crate::runtime::timer::TimerQueue;
use crate::runtime::timer_heap::TimerHeapConfig;
use crate::threading::{
    LockType, LockedCell, Notifiable, Notifier, Threading, WaitOutcome,
};
use crate::types::{Time, TimerId};
use std::sync::OnceLock;
use std::time::Duration;

/// A lock-protected, optionally notifiable timer queue.
#[derive(Debug)]
pub struct SharedTimerQueue {
    queue: LockedCell<TimerQueue>,
    notifier: OnceLock<Notifier>,
}

impl SharedTimerQueue {
    /// Creates a queue guarded by a recursive lock from `threading`.
    ///
    /// Without lock callbacks the queue is guarded by its own mutex only.
    pub fn new(threading: &Threading, config: TimerHeapConfig) -> Result<Self> {
        let lock = match threading.negotiate_locktype(LockType::RECURSIVE) {
            Some(locktype) => Some(threading.alloc_lock(locktype)?),
            None => None,
        };
        Ok(Self {
            queue: LockedCell::new(lock, TimerQueue::with_config(config)?),
            notifier: OnceLock::new(),
        })
    }

    /// Runs `f` on the queue and notifies if the earliest deadline moved.
    fn mutate<R>(&self, f: impl FnOnce(&mut TimerQueue) -> Result<R>) -> Result<R> {
        let (result, moved) = self.queue.with(|queue| {
            let before = queue.next_deadline();
            let result = f(queue);
            (result, queue.next_deadline() != before)
        })?;
        if moved {
            self.notify()?;
        }
        result
    }

    fn notify(&self) -> Result<()> {
        match self.notifier.get() {
            Some(notifier) => notifier.notify(),
            None => Ok(()),
        }
    }

    /// Arms a new timer.
    pub fn schedule(&self, deadline: Time) -> Result<TimerId> {
        self.mutate(|queue| queue.schedule(deadline))
    }

    /// Disarms a pending timer and returns its deadline.
    pub fn cancel(&self, id: TimerId) -> Result<Time> {
        self.mutate(|queue| queue.cancel(id))
    }

    /// Moves a pending timer to a new deadline.
    pub fn reschedule(&self, id: TimerId, deadline: Time) -> Result<()> {
        self.mutate(|queue| queue.reschedule(id, deadline))
    }

    /// Fires every timer with a deadline `<= now`, earliest first.
    pub fn pop_expired(&self, now: Time) -> Result<Vec<TimerId>> {
        self.mutate(|queue| Ok(queue.pop_expired(now)))
    }

    /// Cancels every pending timer.
    pub fn clear(&self) -> Result<()> {
        self.mutate(|queue| {
            queue.clear();
            Ok(())
        })
    }

    /// Returns the earliest pending deadline.
    pub fn next_deadline(&self) -> Result<Option<Time>> {
        self.queue.with(|queue| queue.next_deadline())
    }

    /// Returns true if the timer has neither fired nor been cancelled.
    pub fn is_pending(&self, id: TimerId) -> Result<bool> {
        self.queue.with(|queue| queue.is_pending(id))
    }

    /// Returns the number of pending timers.
    pub fn len(&self) -> Result<usize> {
        self.queue.with(|queue| queue.len())
    }

    /// Returns true if no timer is pending.
    pub fn is_empty(&self) -> Result<bool> {
        self.queue.with(|queue| queue.is_empty())
    }

    /// Runs `f` with exclusive access to the queue. Does not notify.
    pub fn with<R>(&self, f: impl FnOnce(&mut TimerQueue) -> R) -> Result<R> {
        self.queue.with(f)
    }

    /// Returns the change counter to pass to [`wait_for_change`](Self::wait_for_change).
    ///
    /// Always zero for a queue that is not notifiable.
    #[must_use]
    pub fn change_sequence(&self) -> u64 {
        self.notifier.get().map_or(0, Notifier::sequence)
    }

    /// Blocks until the earliest deadline changes after `seen` was read, or
    /// until `timeout` elapses.
    ///
    /// Fails with `NotifySetupFailed` if the queue is not notifiable.
    pub fn wait_for_change(&self, seen: u64, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let notifier = self
            .notifier
            .get()
            .ok_or_else(|| Error::notify_setup_failed("timer queue is not notifiable"))?;
        notifier.wait_for_change(seen, timeout)
    }
}

impl Notifiable for SharedTimerQueue {
    fn notifier(&self) -> Option<&Notifier> {
        self.notifier.get()
    }

    fn attach_notifier(&self, notifier: Notifier) -> Result<()> {
        // Losing a race to another attach is fine; one notifier is enough.
        let _ = self.notifier.set(notifier);
        Ok(())
    }
}
