//! Timer scheduling and runtime setup.
//!
//! This module contains the timer machinery and the pieces that wire it to
//! the threading layer:
//!
//! - [`timer_heap`]: Indexed min-heap over externally owned timed objects
//! - [`timer`]: Single-threaded timer queue that owns its records
//! - [`shared_timer`]: Lock-protected, notifiable timer queue
//! - [`config`]: Runtime configuration types
//! - [`env_config`]: Environment variable and TOML overrides
//! - [`builder`]: Runtime builder and handle
//!
//! # Runtime Builder
//!
//! The runtime is configured with a fluent, move-based builder API. Each
//! builder method consumes `self` and returns an updated builder.
//!
//! ## Quick Start
//!
//! ```ignore
//! use evcore::runtime::RuntimeBuilder;
//! use evcore::Time;
//!
//! let runtime = RuntimeBuilder::new().build()?;
//! let timers = runtime.timer_queue()?;
//! let id = timers.schedule(Time::from_millis(250))?;
//! ```
//!
//! ## Single-Threaded
//!
//! ```ignore
//! use evcore::runtime::RuntimeBuilder;
//!
//! // No lock providers: shared queues fall back to their own mutex and
//! // cannot be made notifiable.
//! let runtime = RuntimeBuilder::current_thread().build()?;
//! ```
//!
//! ## Development
//!
//! ```ignore
//! use evcore::runtime::RuntimeBuilder;
//!
//! // Lock misuse panics on the offending thread instead of aborting.
//! let runtime = RuntimeBuilder::debug()
//!     .max_timer_heap_capacity(4096)
//!     .build()?;
//! ```
//!
//! ## Config File + Environment Overrides
//!
//! ```ignore
//! use evcore::runtime::RuntimeBuilder;
//!
//! // Requires the `config-file` feature.
//! let runtime = RuntimeBuilder::from_toml("config/evcore.toml")?
//!     .with_env_overrides()?
//!     .build()?;
//! ```
//!
//! # Configuration Reference (Defaults + Notes)
//!
//! - `timer_heap_capacity`: default = 0. Reserving up front avoids growth on the hot path.
//! - `max_timer_heap_capacity`: default = unbounded. Scheduling past it fails with `OutOfMemory`.
//! - `platform_threads`: default = on with the `platform-threads` feature.
//! - `debug_locks`: default = off. Every lock operation is checked and traced.
//! - `violation_response`: default = `Abort`.

pub mod builder;
pub mod config;
pub mod env_config;
pub mod shared_timer;
pub mod timer;
pub mod timer_heap;

pub use builder::{Runtime, RuntimeBuilder};
pub use config::RuntimeConfig;
pub use shared_timer::SharedTimerQueue;
pub use timer::TimerQueue;
pub use timer_heap::{HeapViolation, TimerHeap, TimerHeapConfig};
