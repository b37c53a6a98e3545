//! Threading configuration.
//!
//! Providers are registered on a [`ThreadingBuilder`] and frozen into an
//! immutable [`Threading`] by [`build`](ThreadingBuilder::build). Because the
//! builder is consumed, nothing can swap providers once locks exist.
//!
//! ```ignore
//! let threading = ThreadingBuilder::new()
//!     .use_platform_threads()?
//!     .enable_lock_debugging()
//!     .build();
//! let lock = threading.alloc_lock(LockType::RECURSIVE)?;
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::threading::condition::{Condition, ConditionCallbacks, CONDITION_API_VERSION};
use crate::threading::debug::{DebugConditionApi, DebugLockApi, ViolationResponse};
use crate::threading::lock::{Lock, LockCallbacks, LockType, LOCK_API_VERSION};
use crate::threading::notify::{Notifiable, Notifier};
use crate::threading::thread_id::ThreadIdFn;
use crate::tracing_compat::{debug, warn};
use core::fmt;
use std::sync::Arc;

/// Builder for a [`Threading`] configuration.
#[derive(Default)]
pub struct ThreadingBuilder {
    lock: Option<LockCallbacks>,
    condition: Option<ConditionCallbacks>,
    thread_id: Option<ThreadIdFn>,
    debug_locks: bool,
    violation_response: ViolationResponse,
}

impl ThreadingBuilder {
    /// Create a builder with nothing registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the lock provider.
    ///
    /// Fails with `AlreadyInUse` if a different table was registered before
    /// (re-registering the identical table is accepted), `UnsupportedVersion`
    /// on a protocol mismatch, and `InvalidCapabilities` if the table does
    /// not offer recursive locks.
    pub fn lock_callbacks(mut self, callbacks: LockCallbacks) -> Result<Self> {
        if let Some(existing) = &self.lock {
            if existing.same_as(&callbacks) {
                debug!("identical lock callbacks registered again");
                return Ok(self);
            }
            return Err(Error::already_in_use("lock"));
        }
        if callbacks.lock_api_version != LOCK_API_VERSION {
            return Err(Error::unsupported_version(
                "lock",
                LOCK_API_VERSION,
                callbacks.lock_api_version,
            ));
        }
        if !callbacks.supported_locktypes.is_recursive() {
            return Err(Error::new(ErrorKind::InvalidCapabilities).with_message(format!(
                "lock callbacks advertise {:?}; recursive locks are required",
                callbacks.supported_locktypes
            )));
        }
        debug!(
            version = callbacks.lock_api_version,
            locktypes = ?callbacks.supported_locktypes,
            "lock callbacks registered"
        );
        self.lock = Some(callbacks);
        Ok(self)
    }

    /// Register the condition-variable provider.
    ///
    /// Same `AlreadyInUse` and `UnsupportedVersion` rules as
    /// [`lock_callbacks`](Self::lock_callbacks).
    pub fn condition_callbacks(mut self, callbacks: ConditionCallbacks) -> Result<Self> {
        if let Some(existing) = &self.condition {
            if existing.same_as(&callbacks) {
                debug!("identical condition callbacks registered again");
                return Ok(self);
            }
            return Err(Error::already_in_use("condition"));
        }
        if callbacks.condition_api_version != CONDITION_API_VERSION {
            return Err(Error::unsupported_version(
                "condition",
                CONDITION_API_VERSION,
                callbacks.condition_api_version,
            ));
        }
        debug!(
            version = callbacks.condition_api_version,
            "condition callbacks registered"
        );
        self.condition = Some(callbacks);
        Ok(self)
    }

    /// Register the thread-identity function. A later call replaces it.
    #[must_use]
    pub fn thread_id_fn(mut self, f: ThreadIdFn) -> Self {
        self.thread_id = Some(f);
        self
    }

    /// Register the built-in `parking_lot` providers.
    ///
    /// Fails with `PlatformUnsupported` when built without the
    /// `platform-threads` feature.
    #[cfg(feature = "platform-threads")]
    pub fn use_platform_threads(self) -> Result<Self> {
        use crate::threading::platform;

        let builder = self
            .lock_callbacks(platform::lock_callbacks())?
            .condition_callbacks(platform::condition_callbacks())?
            .thread_id_fn(platform::thread_id_fn());
        debug!("platform threading selected");
        Ok(builder)
    }

    /// Register the built-in `parking_lot` providers.
    ///
    /// Fails with `PlatformUnsupported` when built without the
    /// `platform-threads` feature.
    #[cfg(not(feature = "platform-threads"))]
    pub fn use_platform_threads(self) -> Result<Self> {
        drop(self);
        Err(Error::new(ErrorKind::PlatformUnsupported)
            .with_message("built without the `platform-threads` feature"))
    }

    /// Wrap the registered providers in lock debugging at build time.
    #[must_use]
    pub fn enable_lock_debugging(mut self) -> Self {
        self.debug_locks = true;
        self
    }

    /// Choose what lock debugging does after logging a violation.
    #[must_use]
    pub fn violation_response(mut self, response: ViolationResponse) -> Self {
        self.violation_response = response;
        self
    }

    /// Freeze the configuration.
    #[must_use]
    pub fn build(self) -> Threading {
        let Self {
            mut lock,
            mut condition,
            thread_id,
            debug_locks,
            violation_response,
        } = self;

        let debugging = debug_locks && lock.is_some();
        if debugging {
            lock = lock.map(|cbs| DebugLockApi::wrap(cbs, thread_id.clone(), violation_response));
            condition = condition
                .map(|cbs| DebugConditionApi::wrap(cbs, thread_id.clone(), violation_response));
        } else if debug_locks {
            debug!("lock debugging requested without lock callbacks; nothing to wrap");
        }

        debug!(
            locking = lock.is_some(),
            conditions = condition.is_some(),
            thread_ids = thread_id.is_some(),
            debug_locks = debugging,
            "threading configured"
        );

        Threading {
            inner: Arc::new(ThreadingInner {
                lock,
                condition,
                thread_id,
                debug_locks: debugging,
                violation_response,
            }),
        }
    }
}

impl fmt::Debug for ThreadingBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadingBuilder")
            .field("lock", &self.lock)
            .field("condition", &self.condition)
            .field("thread_id", &self.thread_id.is_some())
            .field("debug_locks", &self.debug_locks)
            .field("violation_response", &self.violation_response)
            .finish()
    }
}

struct ThreadingInner {
    lock: Option<LockCallbacks>,
    condition: Option<ConditionCallbacks>,
    thread_id: Option<ThreadIdFn>,
    debug_locks: bool,
    violation_response: ViolationResponse,
}

/// Negotiated lock, condition and thread-identity providers.
///
/// Cheap to clone. A `Threading` with nothing registered is valid and
/// describes a single-threaded runtime: lock allocation fails and shared
/// structures fall back to their own mutexes.
#[derive(Clone)]
pub struct Threading {
    inner: Arc<ThreadingInner>,
}

impl Threading {
    /// Shorthand for [`ThreadingBuilder::new`].
    #[must_use]
    pub fn builder() -> ThreadingBuilder {
        ThreadingBuilder::new()
    }

    /// A configuration with no providers.
    #[must_use]
    pub fn disabled() -> Self {
        ThreadingBuilder::new().build()
    }

    /// Returns true if lock callbacks are registered.
    #[must_use]
    pub fn has_locking(&self) -> bool {
        self.inner.lock.is_some()
    }

    /// Returns true if condition callbacks are registered.
    #[must_use]
    pub fn has_conditions(&self) -> bool {
        self.inner.condition.is_some()
    }

    /// Returns true if providers are wrapped in lock debugging.
    #[must_use]
    pub fn is_debugging(&self) -> bool {
        self.inner.debug_locks
    }

    /// Returns the configured violation response.
    #[must_use]
    pub fn violation_response(&self) -> ViolationResponse {
        self.inner.violation_response
    }

    /// Returns the capability set of the lock provider.
    #[must_use]
    pub fn supported_locktypes(&self) -> Option<LockType> {
        self.inner.lock.as_ref().map(|cbs| cbs.supported_locktypes)
    }

    /// Returns true if the lock provider can allocate `locktype`.
    #[must_use]
    pub fn supports(&self, locktype: LockType) -> bool {
        self.supported_locktypes()
            .is_some_and(|supported| supported.contains(locktype))
    }

    /// Picks the best available lock type for `wanted`.
    ///
    /// A read/write request falls back to a recursive lock when the provider
    /// lacks read/write support. Returns `None` when locking is unavailable.
    #[must_use]
    pub fn negotiate_locktype(&self, wanted: LockType) -> Option<LockType> {
        if self.supports(wanted) {
            return Some(wanted);
        }
        if wanted.is_readwrite() && self.supports(LockType::RECURSIVE) {
            warn!(
                wanted = ?wanted,
                "read/write locks unsupported by provider; using a recursive lock"
            );
            return Some(LockType::RECURSIVE);
        }
        None
    }

    /// Allocates a lock of the given type.
    pub fn alloc_lock(&self, locktype: LockType) -> Result<Lock> {
        let Some(cbs) = &self.inner.lock else {
            return Err(Error::new(ErrorKind::LockAllocFailed)
                .with_message("no lock callbacks registered"));
        };
        if !cbs.supported_locktypes.contains(locktype) {
            return Err(Error::new(ErrorKind::LockAllocFailed).with_message(format!(
                "provider does not support {locktype:?}"
            )));
        }
        Lock::alloc(Arc::clone(&cbs.provider), locktype)
    }

    /// Allocates a condition variable.
    pub fn alloc_condition(&self) -> Result<Condition> {
        let Some(cbs) = &self.inner.condition else {
            return Err(Error::condition_failed("no condition callbacks registered"));
        };
        Condition::alloc(Arc::clone(&cbs.provider))
    }

    /// Returns the calling thread's id, if a thread-id function is registered.
    #[must_use]
    pub fn thread_id(&self) -> Option<u64> {
        self.inner.thread_id.as_ref().map(|id| id())
    }

    /// Attaches a [`Notifier`] to `target` so other threads can wake it.
    ///
    /// Does nothing if `target` already has one. Fails with
    /// `NotifySetupFailed` when locks or conditions are not registered.
    pub fn make_notifiable<T: Notifiable + ?Sized>(&self, target: &T) -> Result<()> {
        if target.notifier().is_some() {
            return Ok(());
        }
        if !self.has_locking() {
            return Err(Error::notify_setup_failed("no lock callbacks registered"));
        }
        if !self.has_conditions() {
            return Err(Error::notify_setup_failed(
                "no condition callbacks registered",
            ));
        }
        let lock = self.alloc_lock(LockType::RECURSIVE).map_err(|e| {
            Error::notify_setup_failed("could not allocate notifier lock").with_source(e)
        })?;
        let condition = self.alloc_condition().map_err(|e| {
            Error::notify_setup_failed("could not allocate notifier condition").with_source(e)
        })?;
        target.attach_notifier(Notifier::new(lock, condition))?;
        debug!("shared structure made notifiable");
        Ok(())
    }
}

impl fmt::Debug for Threading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Threading")
            .field("lock", &self.inner.lock)
            .field("condition", &self.inner.condition)
            .field("thread_ids", &self.inner.thread_id.is_some())
            .field("debug_locks", &self.inner.debug_locks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{init_test_logging, platform_threading};
    use crate::threading::lock::{LockHandle, LockMode, RawLockApi};
    use crate::{test_complete, test_phase};
    use std::sync::OnceLock;

    struct RecordingApi;

    impl RawLockApi for RecordingApi {
        fn alloc(&self, _locktype: LockType) -> Result<LockHandle> {
            Ok(LockHandle::new(()))
        }
        fn free(&self, _lock: &LockHandle, _locktype: LockType) {}
        fn lock(&self, _mode: LockMode, _lock: &LockHandle) -> Result<()> {
            Ok(())
        }
        fn unlock(&self, _mode: LockMode, _lock: &LockHandle) -> Result<()> {
            Ok(())
        }
    }

    fn recursive_only() -> LockCallbacks {
        LockCallbacks::new(Arc::new(RecordingApi))
    }

    #[test]
    fn rejects_wrong_lock_version() {
        init_test_logging();
        test_phase!("rejects_wrong_lock_version");
        let mut cbs = recursive_only();
        cbs.lock_api_version = LOCK_API_VERSION + 1;
        let err = ThreadingBuilder::new()
            .lock_callbacks(cbs)
            .expect_err("version mismatch");
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
        test_complete!("rejects_wrong_lock_version");
    }

    #[test]
    fn rejects_table_without_recursive_locks() {
        let cbs = recursive_only().with_supported_locktypes(LockType::READWRITE);
        let err = ThreadingBuilder::new()
            .lock_callbacks(cbs)
            .expect_err("no recursion");
        assert_eq!(err.kind(), ErrorKind::InvalidCapabilities);
    }

    #[test]
    fn second_lock_table_is_in_use_but_identical_one_is_accepted() {
        let cbs = recursive_only();
        let builder = ThreadingBuilder::new()
            .lock_callbacks(cbs.clone())
            .expect("first")
            .lock_callbacks(cbs)
            .expect("identical");
        let err = builder
            .lock_callbacks(recursive_only())
            .expect_err("different table");
        assert_eq!(err.kind(), ErrorKind::AlreadyInUse);
    }

    #[test]
    fn platform_threads_twice_is_accepted() {
        let threading = ThreadingBuilder::new()
            .use_platform_threads()
            .expect("first")
            .use_platform_threads()
            .expect("second")
            .build();
        assert!(threading.has_locking() && threading.has_conditions());
        assert!(threading.thread_id().is_some());
    }

    #[test]
    fn negotiation_falls_back_to_recursive() {
        let threading = ThreadingBuilder::new()
            .lock_callbacks(recursive_only())
            .expect("register")
            .build();
        assert!(threading.supports(LockType::RECURSIVE));
        assert!(!threading.supports(LockType::READWRITE));
        assert_eq!(
            threading.negotiate_locktype(LockType::READWRITE),
            Some(LockType::RECURSIVE)
        );
        assert!(threading.alloc_lock(LockType::READWRITE).is_err());

        let full = platform_threading();
        assert_eq!(
            full.negotiate_locktype(LockType::READWRITE),
            Some(LockType::READWRITE)
        );
        assert_eq!(Threading::disabled().negotiate_locktype(LockType::PLAIN), None);
    }

    #[test]
    fn alloc_without_providers_fails() {
        let threading = Threading::disabled();
        assert_eq!(
            threading
                .alloc_lock(LockType::RECURSIVE)
                .expect_err("none")
                .kind(),
            ErrorKind::LockAllocFailed
        );
        assert!(threading.alloc_condition().is_err());
        assert!(threading.thread_id().is_none());
    }

    struct Target(OnceLock<Notifier>);

    impl Notifiable for Target {
        fn notifier(&self) -> Option<&Notifier> {
            self.0.get()
        }

        fn attach_notifier(&self, notifier: Notifier) -> Result<()> {
            let _ = self.0.set(notifier);
            Ok(())
        }
    }

    #[test]
    fn make_notifiable_is_idempotent() {
        let threading = platform_threading();
        let target = Target(OnceLock::new());
        threading.make_notifiable(&target).expect("first");
        let first = target.notifier().map(|n| n as *const Notifier);
        threading.make_notifiable(&target).expect("second");
        assert_eq!(first, target.notifier().map(|n| n as *const Notifier));
    }

    #[test]
    fn make_notifiable_needs_conditions() {
        let threading = ThreadingBuilder::new()
            .lock_callbacks(recursive_only())
            .expect("register")
            .build();
        let err = threading
            .make_notifiable(&Target(OnceLock::new()))
            .expect_err("no conditions");
        assert_eq!(err.kind(), ErrorKind::NotifySetupFailed);
    }
}
