//! Built-in providers backed by `parking_lot`.
//!
//! Each provider lock is a small state machine (owner, recursion depth,
//! reader count) behind a `parking_lot::Mutex`, with a `Condvar` that
//! blocked acquirers park on. Condition variables hand out wakeups as a
//! counted budget: a signal grants one wakeup, a broadcast grants one per
//! current waiter, and a waiter reports [`WaitOutcome::Signalled`] only after
//! claiming one. A waiter can only claim wakeups granted after it started
//! waiting.
//!
//! Lock order inside a condition wait is condition state, then lock state.
//! Nothing takes them in the opposite order.

use crate::error::{Error, ErrorKind, Result};
use crate::threading::condition::{
    ConditionCallbacks, ConditionHandle, RawConditionApi, WaitOutcome,
};
use crate::threading::lock::{LockCallbacks, LockHandle, LockMode, LockType, RawLockApi};
use crate::threading::thread_id::{current_thread_id, ThreadIdFn};
use parking_lot::{Condvar, Mutex};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct LockState {
    owner: Option<u64>,
    depth: u32,
    readers: u32,
}

/// A lock allocated by [`PlatformLockApi`].
#[derive(Debug)]
pub struct PlatformLock {
    locktype: LockType,
    state: Mutex<LockState>,
    released: Condvar,
}

impl PlatformLock {
    fn new(locktype: LockType) -> Self {
        Self {
            locktype,
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
        }
    }

    fn is_shared(&self, mode: LockMode) -> bool {
        self.locktype.is_readwrite() && mode.is_read()
    }

    fn acquire(&self, mode: LockMode) -> Result<()> {
        let me = current_thread_id();
        let shared = self.is_shared(mode);
        let mut state = self.state.lock();
        loop {
            if shared {
                if state.owner.is_none() {
                    state.readers += 1;
                    return Ok(());
                }
            } else if state.readers == 0 {
                match state.owner {
                    None => {
                        state.owner = Some(me);
                        state.depth = 1;
                        return Ok(());
                    }
                    Some(owner) if owner == me => {
                        if !self.locktype.is_recursive() {
                            if mode.is_try() {
                                return Err(Error::new(ErrorKind::WouldBlock));
                            }
                            return Err(Error::lock_failed(
                                "relocking a non-recursive lock held by the calling thread",
                            ));
                        }
                        state.depth = state
                            .depth
                            .checked_add(1)
                            .ok_or_else(|| Error::lock_failed("recursion depth overflow"))?;
                        return Ok(());
                    }
                    Some(_) => {}
                }
            }
            if mode.is_try() {
                return Err(Error::new(ErrorKind::WouldBlock));
            }
            self.released.wait(&mut state);
        }
    }

    fn release(&self, mode: LockMode) -> Result<()> {
        let mut state = self.state.lock();
        if self.is_shared(mode) {
            if state.readers == 0 {
                return Err(Error::lock_failed("shared unlock of a lock with no readers"));
            }
            state.readers -= 1;
            if state.readers == 0 {
                self.released.notify_all();
            }
            return Ok(());
        }

        if state.owner != Some(current_thread_id()) {
            return Err(Error::lock_failed(
                "unlock by a thread that does not hold the lock",
            ));
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.released.notify_all();
        }
        Ok(())
    }

    /// Drops every level of the caller's hold and returns the depth.
    fn release_for_wait(&self) -> Result<u32> {
        let mut state = self.state.lock();
        if state.owner != Some(current_thread_id()) {
            return Err(Error::condition_failed(
                "waiting on a condition without holding its lock",
            ));
        }
        let depth = std::mem::take(&mut state.depth);
        state.owner = None;
        self.released.notify_all();
        Ok(depth)
    }

    fn reacquire_after_wait(&self, depth: u32) {
        let me = current_thread_id();
        let mut state = self.state.lock();
        while state.owner.is_some() || state.readers > 0 {
            self.released.wait(&mut state);
        }
        state.owner = Some(me);
        state.depth = depth;
    }
}

#[derive(Debug, Default)]
struct ConditionState {
    /// Bumped by every signal or broadcast.
    generation: u64,
    waiters: usize,
    /// Granted wakeups not yet claimed. Never exceeds `waiters`.
    pending: usize,
}

impl ConditionState {
    /// Takes a granted wakeup if one was sent after `ticket` was issued.
    fn claim(&mut self, ticket: u64) -> bool {
        if self.generation == ticket || self.pending == 0 {
            return false;
        }
        self.pending -= 1;
        true
    }
}

/// A condition variable allocated by [`PlatformConditionApi`].
#[derive(Debug, Default)]
pub struct PlatformCondition {
    state: Mutex<ConditionState>,
    wakeup: Condvar,
}

/// Lock provider supporting plain, recursive and read/write locks.
#[derive(Debug, Default)]
pub struct PlatformLockApi;

fn platform_lock(handle: &LockHandle) -> Result<&PlatformLock> {
    handle
        .downcast_ref::<PlatformLock>()
        .ok_or_else(|| Error::lock_failed("lock was not allocated by the platform provider"))
}

impl RawLockApi for PlatformLockApi {
    fn alloc(&self, locktype: LockType) -> Result<LockHandle> {
        Ok(LockHandle::new(PlatformLock::new(locktype)))
    }

    fn free(&self, _lock: &LockHandle, _locktype: LockType) {}

    fn lock(&self, mode: LockMode, lock: &LockHandle) -> Result<()> {
        platform_lock(lock)?.acquire(mode)
    }

    fn unlock(&self, mode: LockMode, lock: &LockHandle) -> Result<()> {
        platform_lock(lock)?.release(mode)
    }
}

/// Condition provider whose waits work with [`PlatformLockApi`] locks.
#[derive(Debug, Default)]
pub struct PlatformConditionApi;

impl RawConditionApi for PlatformConditionApi {
    fn alloc(&self) -> Result<ConditionHandle> {
        Ok(ConditionHandle::new(PlatformCondition::default()))
    }

    fn free(&self, _cond: &ConditionHandle) {}

    fn signal(&self, cond: &ConditionHandle, broadcast: bool) -> Result<()> {
        let cond = platform_condition(cond)?;
        let mut state = cond.state.lock();
        if state.waiters == 0 {
            return Ok(());
        }
        state.generation = state.generation.wrapping_add(1);
        state.pending = if broadcast {
            state.waiters
        } else {
            (state.pending + 1).min(state.waiters)
        };
        // Waiters that arrived after an earlier grant cannot claim it, so
        // `notify_one` could pick the wrong thread.
        cond.wakeup.notify_all();
        Ok(())
    }

    fn wait(
        &self,
        cond: &ConditionHandle,
        lock: &LockHandle,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        let cond = platform_condition(cond)?;
        let lock = lock
            .downcast_ref::<PlatformLock>()
            .ok_or_else(|| Error::condition_failed("lock was not allocated by the platform provider"))?;

        let mut state = cond.state.lock();
        let ticket = state.generation;
        let depth = lock.release_for_wait()?;
        state.waiters += 1;
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));

        let outcome = loop {
            if state.claim(ticket) {
                break WaitOutcome::Signalled;
            }
            match deadline {
                Some(deadline) => {
                    if cond.wakeup.wait_until(&mut state, deadline).timed_out() {
                        break if state.claim(ticket) {
                            WaitOutcome::Signalled
                        } else {
                            WaitOutcome::TimedOut
                        };
                    }
                }
                None => cond.wakeup.wait(&mut state),
            }
        };
        state.waiters -= 1;
        drop(state);

        lock.reacquire_after_wait(depth);
        Ok(outcome)
    }
}

fn platform_condition(handle: &ConditionHandle) -> Result<&PlatformCondition> {
    handle.downcast_ref::<PlatformCondition>().ok_or_else(|| {
        Error::condition_failed("condition was not allocated by the platform provider")
    })
}

/// The platform lock table: current version, recursive and read/write.
///
/// Every call returns the same provider instance, so registering it twice
/// is accepted as a no-op.
pub fn lock_callbacks() -> LockCallbacks {
    static PROVIDER: OnceLock<Arc<dyn RawLockApi>> = OnceLock::new();
    let provider = PROVIDER.get_or_init(|| Arc::new(PlatformLockApi));
    LockCallbacks::new(Arc::clone(provider))
        .with_supported_locktypes(LockType::RECURSIVE | LockType::READWRITE)
}

/// The platform condition table.
pub fn condition_callbacks() -> ConditionCallbacks {
    static PROVIDER: OnceLock<Arc<dyn RawConditionApi>> = OnceLock::new();
    let provider = PROVIDER.get_or_init(|| Arc::new(PlatformConditionApi));
    ConditionCallbacks::new(Arc::clone(provider))
}

/// The platform thread-id function.
pub fn thread_id_fn() -> ThreadIdFn {
    Arc::new(current_thread_id)
}
