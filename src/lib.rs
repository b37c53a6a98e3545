//! evcore: the timer-scheduling and locking core of an event-driven I/O runtime.
//!
//! # Overview
//!
//! Two independent pieces live here, composed by whatever runtime embeds them:
//!
//! - An indexed binary min-heap of pending timers. Every tracked object keeps
//!   its own heap slot, so cancelling or rescheduling an armed timer costs
//!   `O(log n)` instead of a scan.
//! - A lock-implementation-agnostic threading layer. The runtime never picks a
//!   threading library itself; it consumes lock, condition-variable and
//!   thread-identity providers negotiated once at setup time, optionally
//!   wrapped in a debug layer that turns lock misuse into a hard failure.
//!
//! # Module Structure
//!
//! - [`record`]: The tracked-object contract (`HeapSlot`, `HeapEntry`) and `TimerRecord`
//! - [`runtime`]: Timer heap, timer queues, runtime configuration and builder
//! - [`threading`]: Lock/condition providers, platform implementation, debug wrapper
//! - [`types`]: Time and identifier types, builder errors
//! - [`util`]: Generational arena backing timer records
//! - [`error`]: Error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod error;
pub mod record;
pub mod runtime;
pub mod threading;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{Error, ErrorCategory, ErrorKind, Recoverability, Result};
pub use record::{EntryStore, HeapEntry, HeapSlot, TimerRecord};
pub use runtime::{
    Runtime, RuntimeBuilder, RuntimeConfig, SharedTimerQueue, TimerHeap, TimerHeapConfig,
    TimerQueue,
};
pub use threading::{
    Condition, ConditionCallbacks, Lock, LockCallbacks, LockMode, LockType, Notifier, Threading,
    ThreadingBuilder, ViolationResponse, WaitOutcome,
};
pub use types::{TimerId, Time};
