//! Tracing compatibility layer for structured logging.
//!
//! - **With `tracing-integration`** (default): re-exports from the `tracing` crate.
//! - **Without it**: no-op macros that compile to nothing.
//!
//! ```rust,ignore
//! use evcore::tracing_compat::{debug, trace};
//!
//! trace!(slots = 16, "timer heap grew");
//! debug!(version = 1, "lock callbacks registered");
//! ```

#[cfg(feature = "tracing-integration")]
pub use tracing::{debug, error, trace, warn};

#[cfg(not(feature = "tracing-integration"))]
mod noop {
    //! No-op implementations when tracing is disabled.

    /// No-op trace-level logging macro.
    #[macro_export]
    macro_rules! trace {
        ($($arg:tt)*) => {};
    }

    /// No-op debug-level logging macro.
    #[macro_export]
    macro_rules! debug {
        ($($arg:tt)*) => {};
    }

    /// No-op warn-level logging macro.
    #[macro_export]
    macro_rules! warn {
        ($($arg:tt)*) => {};
    }

    /// No-op error-level logging macro.
    #[macro_export]
    macro_rules! error {
        ($($arg:tt)*) => {};
    }

    pub use crate::{debug, error, trace, warn};
}

#[cfg(not(feature = "tracing-integration"))]
pub use noop::*;
