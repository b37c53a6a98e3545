//! Condition-variable provider contract and the safe [`Condition`] wrapper.

use crate::error::Result;
use crate::threading::lock::{Lock, LockHandle};
use core::fmt;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Version of the condition provider protocol this crate speaks.
pub const CONDITION_API_VERSION: u32 = 1;

/// How a condition wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitOutcome {
    /// Woken by a signal or broadcast (or spuriously).
    Signalled,
    /// The timeout elapsed first.
    TimedOut,
}

impl WaitOutcome {
    /// Returns true for [`WaitOutcome::TimedOut`].
    #[must_use]
    pub const fn is_timed_out(self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Opaque handle to a provider-allocated condition variable.
#[derive(Clone)]
pub struct ConditionHandle(Arc<dyn Any + Send + Sync>);

impl ConditionHandle {
    /// Wraps a provider's condition object.
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    /// Returns the provider's condition object if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for ConditionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConditionHandle({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

/// Operations a condition-variable provider supplies.
pub trait RawConditionApi: Send + Sync + 'static {
    /// Allocates a condition variable.
    fn alloc(&self) -> Result<ConditionHandle>;

    /// Releases a condition variable. No thread may be waiting on it.
    fn free(&self, cond: &ConditionHandle);

    /// Wakes one waiter, or every waiter when `broadcast` is set.
    fn signal(&self, cond: &ConditionHandle, broadcast: bool) -> Result<()>;

    /// Blocks until signalled or until `timeout` elapses.
    ///
    /// `lock` must be held exclusively by the caller. It is released for the
    /// duration of the block and held again when this returns, whatever the
    /// outcome. A recursive hold is released completely and restored to the
    /// same depth.
    fn wait(
        &self,
        cond: &ConditionHandle,
        lock: &LockHandle,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome>;
}

/// A condition provider table as registered with
/// [`ThreadingBuilder::condition_callbacks`](crate::threading::ThreadingBuilder::condition_callbacks).
#[derive(Clone)]
pub struct ConditionCallbacks {
    /// Protocol version the provider implements.
    pub condition_api_version: u32,
    /// The provider itself.
    pub provider: Arc<dyn RawConditionApi>,
}

impl ConditionCallbacks {
    /// A current-version table.
    pub fn new(provider: Arc<dyn RawConditionApi>) -> Self {
        Self {
            condition_api_version: CONDITION_API_VERSION,
            provider,
        }
    }

    pub(crate) fn same_as(&self, other: &Self) -> bool {
        self.condition_api_version == other.condition_api_version
            && Arc::ptr_eq(&self.provider, &other.provider)
    }
}

impl fmt::Debug for ConditionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionCallbacks")
            .field("condition_api_version", &self.condition_api_version)
            .finish_non_exhaustive()
    }
}

/// A provider condition variable, freed on drop.
pub struct Condition {
    provider: Arc<dyn RawConditionApi>,
    handle: ConditionHandle,
}

impl Condition {
    pub(crate) fn alloc(provider: Arc<dyn RawConditionApi>) -> Result<Self> {
        let handle = provider.alloc()?;
        Ok(Self { provider, handle })
    }

    /// Wakes one waiter.
    pub fn signal(&self) -> Result<()> {
        self.provider.signal(&self.handle, false)
    }

    /// Wakes every waiter.
    pub fn broadcast(&self) -> Result<()> {
        self.provider.signal(&self.handle, true)
    }

    /// Waits on this condition with `lock` held.
    ///
    /// Spurious wakeups are possible; callers re-check their predicate.
    pub fn wait(&self, lock: &Lock, timeout: Option<Duration>) -> Result<WaitOutcome> {
        self.provider.wait(&self.handle, lock.handle(), timeout)
    }
}

impl Drop for Condition {
    fn drop(&mut self) {
        self.provider.free(&self.handle);
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("handle", &self.handle)
            .finish()
    }
}
