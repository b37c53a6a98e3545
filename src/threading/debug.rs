//! Lock debugging.
//!
//! [`DebugLockApi`] and [`DebugConditionApi`] wrap whatever providers were
//! registered and track, per lock, how many times it is held and by which
//! thread. Misuse is a contract violation, not an error value: it is logged
//! at `error` level and then the process aborts (or, with
//! [`ViolationResponse::Panic`], the calling thread panics).
//!
//! Detected misuse:
//!
//! - locking a non-recursive lock the calling thread already holds
//! - unlocking a lock the calling thread does not hold
//! - waiting on a condition without holding the lock passed to the wait
//! - freeing a lock that is still held
//! - access flags that do not match the lock type (`READ`/`WRITE` on a
//!   plain lock, or neither on a read/write lock)
//!
//! Ownership checks need a thread-id function. Without one, only hold
//! counts are tracked.

use crate::error::{Error, Result};
use crate::threading::condition::{ConditionCallbacks, ConditionHandle, RawConditionApi, WaitOutcome};
use crate::threading::lock::{LockCallbacks, LockHandle, LockMode, LockType, RawLockApi};
use crate::threading::thread_id::ThreadIdFn;
use crate::tracing_compat::{error, trace};
use core::fmt;
use core::str::FromStr;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// What lock debugging does after logging a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "config-file", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-file", serde(rename_all = "lowercase"))]
pub enum ViolationResponse {
    /// Terminate the process immediately.
    #[default]
    Abort,
    /// Panic on the offending thread.
    Panic,
}

impl FromStr for ViolationResponse {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "panic" => Ok(Self::Panic),
            other => Err(format!("expected `abort` or `panic`, got `{other}`")),
        }
    }
}

impl fmt::Display for ViolationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => f.write_str("abort"),
            Self::Panic => f.write_str("panic"),
        }
    }
}

#[derive(Debug, Default)]
struct HoldState {
    held_by: Option<u64>,
    count: u32,
    readers: u32,
}

/// The handle payload of a debug-wrapped lock.
#[derive(Debug)]
struct DebugLock {
    inner: LockHandle,
    locktype: LockType,
    state: Mutex<HoldState>,
}

fn debug_lock(handle: &LockHandle) -> Result<&DebugLock> {
    handle
        .downcast_ref::<DebugLock>()
        .ok_or_else(|| Error::internal("lock was not allocated through lock debugging"))
}

struct Checker {
    thread_id: Option<ThreadIdFn>,
    response: ViolationResponse,
}

impl Checker {
    fn current(&self) -> Option<u64> {
        self.thread_id.as_ref().map(|id| id())
    }

    fn violation(&self, what: &str) -> ! {
        error!(violation = what, response = %self.response, "lock debugging detected misuse");
        match self.response {
            ViolationResponse::Abort => std::process::abort(),
            ViolationResponse::Panic => panic!("lock debugging: {what}"),
        }
    }

    fn check_mode(&self, lock: &DebugLock, mode: LockMode) {
        if lock.locktype.is_readwrite() != mode.has_access_flag() {
            self.violation("lock mode access flags do not match the lock type");
        }
    }
}

/// Lock provider decorator that enforces the locking contract.
pub struct DebugLockApi {
    inner: Arc<dyn RawLockApi>,
    checker: Checker,
}

impl DebugLockApi {
    /// Wraps a lock table, keeping its version and capabilities.
    pub fn wrap(
        callbacks: LockCallbacks,
        thread_id: Option<ThreadIdFn>,
        response: ViolationResponse,
    ) -> LockCallbacks {
        let provider = Arc::new(Self {
            inner: callbacks.provider,
            checker: Checker {
                thread_id,
                response,
            },
        });
        LockCallbacks {
            lock_api_version: callbacks.lock_api_version,
            supported_locktypes: callbacks.supported_locktypes,
            provider,
        }
    }
}

impl RawLockApi for DebugLockApi {
    fn alloc(&self, locktype: LockType) -> Result<LockHandle> {
        let inner = self.inner.alloc(locktype)?;
        Ok(LockHandle::new(DebugLock {
            inner,
            locktype,
            state: Mutex::new(HoldState::default()),
        }))
    }

    fn free(&self, lock: &LockHandle, locktype: LockType) {
        let Ok(dl) = debug_lock(lock) else {
            self.checker.violation("freeing a lock not allocated through lock debugging");
        };
        let held = {
            let state = dl.state.lock();
            state.count > 0 || state.readers > 0
        };
        if held {
            self.checker.violation("freeing a lock that is still held");
        }
        self.inner.free(&dl.inner, locktype);
    }

    fn lock(&self, mode: LockMode, lock: &LockHandle) -> Result<()> {
        let dl = debug_lock(lock)?;
        self.checker.check_mode(dl, mode);
        let me = self.checker.current();

        if dl.locktype.is_readwrite() && mode.is_read() {
            self.inner.lock(mode, &dl.inner)?;
            dl.state.lock().readers += 1;
            trace!(lock = ?lock, "debug lock acquired shared");
            return Ok(());
        }

        let relock = {
            let state = dl.state.lock();
            state.count > 0 && me.is_some() && state.held_by == me
        };
        if relock && !dl.locktype.is_recursive() && !mode.is_try() {
            self.checker
                .violation("relocking a non-recursive lock already held by this thread");
        }

        self.inner.lock(mode, &dl.inner)?;

        let mut state = dl.state.lock();
        state.count += 1;
        if !dl.locktype.is_recursive() && state.count != 1 {
            drop(state);
            self.checker
                .violation("non-recursive lock acquired while already held");
        }
        if let Some(me) = me {
            if state.count > 1 && state.held_by != Some(me) {
                drop(state);
                self.checker
                    .violation("lock acquired while recorded as held by another thread");
            }
            state.held_by = Some(me);
        }
        trace!(lock = ?lock, depth = state.count, "debug lock acquired");
        Ok(())
    }

    fn unlock(&self, mode: LockMode, lock: &LockHandle) -> Result<()> {
        let dl = debug_lock(lock)?;
        self.checker.check_mode(dl, mode);

        if dl.locktype.is_readwrite() && mode.is_read() {
            {
                let mut state = dl.state.lock();
                if state.readers == 0 {
                    drop(state);
                    self.checker
                        .violation("shared unlock of a lock with no shared holders");
                }
                state.readers -= 1;
            }
            return self.inner.unlock(mode, &dl.inner);
        }

        let me = self.checker.current();
        {
            let mut state = dl.state.lock();
            if state.count == 0 {
                drop(state);
                self.checker.violation("unlocking a lock that is not held");
            }
            if me.is_some() && state.held_by != me {
                drop(state);
                self.checker
                    .violation("unlocking a lock held by another thread");
            }
            state.count -= 1;
            if state.count == 0 {
                state.held_by = None;
            }
            trace!(lock = ?lock, depth = state.count, "debug lock released");
        }
        self.inner.unlock(mode, &dl.inner)
    }
}

/// Condition provider decorator that checks waits against debug locks.
pub struct DebugConditionApi {
    inner: Arc<dyn RawConditionApi>,
    checker: Checker,
}

impl DebugConditionApi {
    /// Wraps a condition table, keeping its version.
    pub fn wrap(
        callbacks: ConditionCallbacks,
        thread_id: Option<ThreadIdFn>,
        response: ViolationResponse,
    ) -> ConditionCallbacks {
        let provider = Arc::new(Self {
            inner: callbacks.provider,
            checker: Checker {
                thread_id,
                response,
            },
        });
        ConditionCallbacks {
            condition_api_version: callbacks.condition_api_version,
            provider,
        }
    }
}

impl RawConditionApi for DebugConditionApi {
    fn alloc(&self) -> Result<ConditionHandle> {
        self.inner.alloc()
    }

    fn free(&self, cond: &ConditionHandle) {
        self.inner.free(cond);
    }

    fn signal(&self, cond: &ConditionHandle, broadcast: bool) -> Result<()> {
        self.inner.signal(cond, broadcast)
    }

    fn wait(
        &self,
        cond: &ConditionHandle,
        lock: &LockHandle,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        let dl = debug_lock(lock)
            .map_err(|_| Error::condition_failed("waiting with a lock not allocated through lock debugging"))?;
        let me = self.checker.current();

        let saved = {
            let mut state = dl.state.lock();
            if state.count == 0 {
                drop(state);
                self.checker
                    .violation("waiting on a condition without holding its lock");
            }
            if me.is_some() && state.held_by != me {
                drop(state);
                self.checker
                    .violation("waiting on a condition with a lock held by another thread");
            }
            let saved = (state.count, state.held_by);
            state.count = 0;
            state.held_by = None;
            saved
        };

        let outcome = self.inner.wait(cond, &dl.inner, timeout);

        let mut state = dl.state.lock();
        state.count = saved.0;
        state.held_by = saved.1;
        outcome
    }
}
