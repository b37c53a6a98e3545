//! Data guarded by a provider lock.
//!
//! The provider lock is what serializes access across threads. The data also
//! sits in a `parking_lot::Mutex`, taken with `try_lock` only: once the
//! provider lock is held it is always free, and finding it taken means the
//! provider failed to exclude another thread (or the cell was re-entered),
//! which is reported as an internal error instead of blocking.

use crate::error::{Error, Result};
use crate::threading::lock::Lock;
use parking_lot::Mutex;

/// A value protected by an optional provider lock.
///
/// Without a provider lock (threading not configured) the cell falls back to
/// blocking on its own mutex.
#[derive(Debug)]
pub struct LockedCell<T> {
    lock: Option<Lock>,
    data: Mutex<T>,
}

impl<T> LockedCell<T> {
    /// Wraps `value` behind `lock`.
    pub fn new(lock: Option<Lock>, value: T) -> Self {
        Self {
            lock,
            data: Mutex::new(value),
        }
    }

    /// Returns the provider lock, if any.
    #[must_use]
    pub const fn provider_lock(&self) -> Option<&Lock> {
        self.lock.as_ref()
    }

    /// Runs `f` with exclusive access to the value.
    ///
    /// Not re-entrant: calling `with` from inside `f` on the same cell fails
    /// with an internal error.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        match &self.lock {
            Some(lock) => {
                let _guard = lock.acquire()?;
                let mut data = self
                    .data
                    .try_lock()
                    .ok_or_else(|| Error::internal("locked cell entered without exclusive access"))?;
                Ok(f(&mut data))
            }
            None => Ok(f(&mut self.data.lock())),
        }
    }

    /// Consumes the cell and returns the value.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}
