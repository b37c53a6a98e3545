//! Lock provider contract and the safe [`Lock`] wrapper.
//!
//! A lock provider is a table of four operations over opaque handles:
//! allocate, free, lock and unlock. The runtime never looks inside a handle;
//! each provider downcasts to its own type.

use crate::error::{Error, Result};
use crate::tracing_compat::warn;
use core::fmt;
use std::any::Any;
use std::ops::BitOr;
use std::sync::Arc;

/// Version of the lock provider protocol this crate speaks.
pub const LOCK_API_VERSION: u32 = 1;

/// Capability bits of a lock.
///
/// The empty set is a plain mutex that the owning thread must not re-lock.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LockType(u32);

impl LockType {
    /// Plain, non-recursive mutex.
    pub const PLAIN: Self = Self(0);
    /// The owning thread may lock again; each lock needs a matching unlock.
    pub const RECURSIVE: Self = Self(1);
    /// Shared (`READ`) and exclusive (`WRITE`) acquisition.
    pub const READWRITE: Self = Self(2);

    /// Builds a set from raw bits, dropping unknown ones.
    #[must_use]
    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & (Self::RECURSIVE.0 | Self::READWRITE.0))
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true for the empty set.
    #[must_use]
    pub const fn is_plain(self) -> bool {
        self.0 == 0
    }

    /// Returns true if re-locking by the owner is allowed.
    #[must_use]
    pub const fn is_recursive(self) -> bool {
        self.contains(Self::RECURSIVE)
    }

    /// Returns true if shared acquisition is allowed.
    #[must_use]
    pub const fn is_readwrite(self) -> bool {
        self.contains(Self::READWRITE)
    }
}

impl BitOr for LockType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_recursive(), self.is_readwrite()) {
            (false, false) => f.write_str("LockType(PLAIN)"),
            (true, false) => f.write_str("LockType(RECURSIVE)"),
            (false, true) => f.write_str("LockType(READWRITE)"),
            (true, true) => f.write_str("LockType(RECURSIVE | READWRITE)"),
        }
    }
}

/// Flags passed to lock and unlock calls.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LockMode(u32);

impl LockMode {
    /// No flags: exclusive, blocking.
    pub const NONE: Self = Self(0);
    /// Exclusive acquisition of a read/write lock.
    pub const WRITE: Self = Self(0x04);
    /// Shared acquisition of a read/write lock.
    pub const READ: Self = Self(0x08);
    /// Fail with `WouldBlock` instead of blocking.
    pub const TRY: Self = Self(0x10);

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `other` is set in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true if the mode requests shared access.
    #[must_use]
    pub const fn is_read(self) -> bool {
        self.contains(Self::READ)
    }

    /// Returns true if the mode must not block.
    #[must_use]
    pub const fn is_try(self) -> bool {
        self.contains(Self::TRY)
    }

    /// Returns true if either access flag is set.
    #[must_use]
    pub const fn has_access_flag(self) -> bool {
        self.0 & (Self::READ.0 | Self::WRITE.0) != 0
    }

    /// The mode without the `TRY` bit.
    #[must_use]
    pub const fn blocking(self) -> Self {
        Self(self.0 & !Self::TRY.0)
    }
}

impl BitOr for LockMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockMode({:#04x})", self.0)
    }
}

/// Opaque handle to a provider-allocated lock.
#[derive(Clone)]
pub struct LockHandle(Arc<dyn Any + Send + Sync>);

impl LockHandle {
    /// Wraps a provider's lock object.
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    /// Returns the provider's lock object if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns true if both handles refer to the same lock.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockHandle({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

/// Operations a lock provider supplies.
pub trait RawLockApi: Send + Sync + 'static {
    /// Allocates a lock with the given capabilities.
    fn alloc(&self, locktype: LockType) -> Result<LockHandle>;

    /// Releases a lock. The lock must not be held.
    fn free(&self, lock: &LockHandle, locktype: LockType);

    /// Acquires a lock. With `TRY` in `mode`, fails with `WouldBlock`
    /// instead of blocking.
    fn lock(&self, mode: LockMode, lock: &LockHandle) -> Result<()>;

    /// Releases one acquisition.
    fn unlock(&self, mode: LockMode, lock: &LockHandle) -> Result<()>;
}

/// A lock provider table as registered with
/// [`ThreadingBuilder::lock_callbacks`](crate::threading::ThreadingBuilder::lock_callbacks).
#[derive(Clone)]
pub struct LockCallbacks {
    /// Protocol version the provider implements.
    pub lock_api_version: u32,
    /// Lock types the provider can allocate.
    pub supported_locktypes: LockType,
    /// The provider itself.
    pub provider: Arc<dyn RawLockApi>,
}

impl LockCallbacks {
    /// A current-version table advertising recursive locks.
    pub fn new(provider: Arc<dyn RawLockApi>) -> Self {
        Self {
            lock_api_version: LOCK_API_VERSION,
            supported_locktypes: LockType::RECURSIVE,
            provider,
        }
    }

    /// Replaces the advertised capability set.
    #[must_use]
    pub fn with_supported_locktypes(mut self, locktypes: LockType) -> Self {
        self.supported_locktypes = locktypes;
        self
    }

    /// Returns true if both tables are field-for-field identical.
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        self.lock_api_version == other.lock_api_version
            && self.supported_locktypes == other.supported_locktypes
            && Arc::ptr_eq(&self.provider, &other.provider)
    }
}

impl fmt::Debug for LockCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCallbacks")
            .field("lock_api_version", &self.lock_api_version)
            .field("supported_locktypes", &self.supported_locktypes)
            .finish_non_exhaustive()
    }
}

/// A provider lock, freed on drop.
pub struct Lock {
    provider: Arc<dyn RawLockApi>,
    handle: LockHandle,
    locktype: LockType,
}

impl Lock {
    pub(crate) fn alloc(provider: Arc<dyn RawLockApi>, locktype: LockType) -> Result<Self> {
        let handle = provider.alloc(locktype)?;
        Ok(Self {
            provider,
            handle,
            locktype,
        })
    }

    /// Returns the capabilities this lock was allocated with.
    #[must_use]
    pub const fn locktype(&self) -> LockType {
        self.locktype
    }

    /// Returns the provider handle.
    #[must_use]
    pub const fn handle(&self) -> &LockHandle {
        &self.handle
    }

    /// Mode used for exclusive acquisition of this lock.
    const fn exclusive_mode(&self) -> LockMode {
        if self.locktype.is_readwrite() {
            LockMode::WRITE
        } else {
            LockMode::NONE
        }
    }

    /// Acquires exclusively, blocking.
    pub fn lock(&self) -> Result<()> {
        self.lock_with(self.exclusive_mode())
    }

    /// Acquires exclusively without blocking.
    pub fn try_lock(&self) -> Result<()> {
        self.lock_with(self.exclusive_mode() | LockMode::TRY)
    }

    /// Releases one exclusive acquisition.
    pub fn unlock(&self) -> Result<()> {
        self.unlock_with(self.exclusive_mode())
    }

    /// Acquires with explicit mode flags.
    pub fn lock_with(&self, mode: LockMode) -> Result<()> {
        self.provider.lock(mode, &self.handle)
    }

    /// Releases with explicit mode flags.
    pub fn unlock_with(&self, mode: LockMode) -> Result<()> {
        self.provider.unlock(mode.blocking(), &self.handle)
    }

    /// Acquires exclusively and returns a guard that unlocks on drop.
    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        self.guarded(self.exclusive_mode())
    }

    /// Like [`acquire`](Self::acquire) but fails with `WouldBlock` instead
    /// of blocking.
    pub fn try_acquire(&self) -> Result<LockGuard<'_>> {
        self.guarded(self.exclusive_mode() | LockMode::TRY)
    }

    /// Acquires shared access on a read/write lock.
    pub fn acquire_read(&self) -> Result<LockGuard<'_>> {
        if !self.locktype.is_readwrite() {
            return Err(Error::lock_failed(format!(
                "shared acquisition of a {:?} lock",
                self.locktype
            )));
        }
        self.guarded(LockMode::READ)
    }

    fn guarded(&self, mode: LockMode) -> Result<LockGuard<'_>> {
        self.lock_with(mode)?;
        Ok(LockGuard {
            lock: self,
            mode: mode.blocking(),
        })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        self.provider.free(&self.handle, self.locktype);
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("handle", &self.handle)
            .field("locktype", &self.locktype)
            .finish()
    }
}

/// Releases the acquisition it was created with when dropped.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a> {
    lock: &'a Lock,
    mode: LockMode,
}

impl LockGuard<'_> {
    /// Returns the guarded lock.
    #[must_use]
    pub const fn lock(&self) -> &Lock {
        self.lock
    }

    /// Returns the mode the lock was acquired with (without `TRY`).
    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.lock.unlock_with(self.mode) {
            warn!(error = %err, "lock guard failed to unlock");
        }
    }
}

impl fmt::Debug for LockGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("lock", &self.lock.handle)
            .field("mode", &self.mode)
            .finish()
    }
}
