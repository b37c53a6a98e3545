//! Pluggable locking, condition variables and thread identity.
//!
//! The runtime never chooses a threading library. Instead it consumes
//! provider tables registered once, before any lock is allocated:
//!
//! - [`lock`]: lock provider contract, lock types and modes, the [`Lock`] wrapper
//! - [`condition`]: condition provider contract and the [`Condition`] wrapper
//! - [`thread_id`]: thread-identity function
//! - [`builder`]: [`ThreadingBuilder`] and the frozen [`Threading`] configuration
//! - [`debug`]: decorators that make lock misuse fatal
//! - [`platform`]: built-in providers on `parking_lot` (feature `platform-threads`)
//! - [`notify`]: [`Notifier`] and the [`Notifiable`] trait
//! - [`locked_cell`]: data guarded by a provider lock
//! - [`global`]: optional install-once process-wide configuration

pub mod builder;
pub mod condition;
pub mod debug;
pub mod global;
pub mod lock;
pub mod locked_cell;
pub mod notify;
#[cfg(feature = "platform-threads")]
pub mod platform;
pub mod thread_id;

pub use builder::{Threading, ThreadingBuilder};
pub use condition::{
    Condition, ConditionCallbacks, ConditionHandle, RawConditionApi, WaitOutcome,
    CONDITION_API_VERSION,
};
pub use debug::{DebugConditionApi, DebugLockApi, ViolationResponse};
pub use lock::{
    Lock, LockCallbacks, LockGuard, LockHandle, LockMode, LockType, RawLockApi, LOCK_API_VERSION,
};
pub use locked_cell::LockedCell;
pub use notify::{Notifiable, Notifier};
pub use thread_id::{current_thread_id, ThreadIdFn};
