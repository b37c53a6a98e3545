//! Error types and error handling strategy for evcore.
//!
//! Every fallible operation in this crate is synchronous and reports failure
//! through [`Result`]. A failed call leaves the structure it was invoked on
//! exactly as it was before the call; there is no partial-failure state to
//! recover from.
//!
//! # Error Categories
//!
//! - **Heap**: capacity growth failures and operations on detached objects
//! - **Registration**: provider tables rejected at setup time
//! - **Platform**: built-in threading support not compiled in
//! - **Notify**: cross-thread wakeup could not be attached
//! - **Primitive**: a lock or condition provider reported failure
//! - **Config**: runtime configuration rejected by the builder
//! - **Internal**: invariant breaks inside this crate
//!
//! The one intentionally fatal path, lock-debugging contract violations, does
//! not go through this module at all; see
//! [`threading::debug`](crate::threading::debug).

use crate::types::builder::BuildError;
use core::fmt;
use std::collections::TryReserveError;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Heap ===
    /// Growing the heap's backing buffer failed.
    OutOfMemory,
    /// The object is not currently enqueued (its heap slot is `-1`).
    NotInHeap,

    // === Registration ===
    /// A callback table carried an unexpected protocol version.
    UnsupportedVersion,
    /// A callback table was already registered.
    AlreadyInUse,
    /// A lock table does not advertise a mandatory capability.
    InvalidCapabilities,

    // === Platform ===
    /// Built-in platform threading was not compiled in.
    PlatformUnsupported,

    // === Notify ===
    /// No usable lock/condition primitive to attach a notifier with.
    NotifySetupFailed,

    // === Primitive ===
    /// The lock provider could not allocate a lock (or none is registered).
    LockAllocFailed,
    /// A lock or unlock call failed.
    LockFailed,
    /// A non-blocking lock attempt found the lock held.
    WouldBlock,
    /// A condition allocate/signal/wait call failed.
    ConditionFailed,

    // === Config ===
    /// Runtime configuration failed validation.
    InvalidConfig,

    // === Internal ===
    /// Internal invariant violation (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::OutOfMemory | Self::NotInHeap => ErrorCategory::Heap,
            Self::UnsupportedVersion | Self::AlreadyInUse | Self::InvalidCapabilities => {
                ErrorCategory::Registration
            }
            Self::PlatformUnsupported => ErrorCategory::Platform,
            Self::NotifySetupFailed => ErrorCategory::Notify,
            Self::LockAllocFailed | Self::LockFailed | Self::WouldBlock | Self::ConditionFailed => {
                ErrorCategory::Primitive
            }
            Self::InvalidConfig => ErrorCategory::Config,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the recoverability classification for this error kind.
    ///
    /// This layer never retries on its own; the classification is a hint for
    /// the runtime's retry policy.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            Self::WouldBlock | Self::OutOfMemory => Recoverability::Transient,
            Self::NotInHeap
            | Self::UnsupportedVersion
            | Self::AlreadyInUse
            | Self::InvalidCapabilities
            | Self::PlatformUnsupported
            | Self::NotifySetupFailed
            | Self::InvalidConfig
            | Self::Internal => Recoverability::Permanent,
            Self::LockAllocFailed | Self::LockFailed | Self::ConditionFailed => {
                Recoverability::Unknown
            }
        }
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.recoverability(), Recoverability::Transient)
    }
}

/// Classification of error recoverability for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Depends on the provider that reported it.
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this error should never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Timer heap failures.
    Heap,
    /// Callback-table registration failures.
    Registration,
    /// Platform threading unavailable.
    Platform,
    /// Notifier attachment failures.
    Notify,
    /// Lock/condition provider failures.
    Primitive,
    /// Builder, environment or config file rejected.
    Config,
    /// Internal errors.
    Internal,
}

/// The main error type for evcore operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns true for [`ErrorKind::NotInHeap`].
    #[must_use]
    pub const fn is_not_in_heap(&self) -> bool {
        matches!(self.kind, ErrorKind::NotInHeap)
    }

    /// Returns true if a non-blocking acquisition found the lock held.
    #[must_use]
    pub const fn is_would_block(&self) -> bool {
        matches!(self.kind, ErrorKind::WouldBlock)
    }

    /// Creates an out-of-memory error for a failed growth to `requested` slots.
    #[must_use]
    pub fn out_of_memory(requested: usize) -> Self {
        Self::new(ErrorKind::OutOfMemory)
            .with_message(format!("failed to grow timer heap to {requested} slots"))
    }

    /// Creates a not-in-heap error.
    #[must_use]
    pub fn not_in_heap(what: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotInHeap).with_message(format!("{what} is not enqueued"))
    }

    /// Creates an unsupported-version error for a callback table.
    #[must_use]
    pub fn unsupported_version(table: &str, expected: u32, actual: u32) -> Self {
        Self::new(ErrorKind::UnsupportedVersion).with_message(format!(
            "{table} callbacks: expected api version {expected}, got {actual}"
        ))
    }

    /// Creates an already-in-use error for a callback table.
    #[must_use]
    pub fn already_in_use(table: &str) -> Self {
        Self::new(ErrorKind::AlreadyInUse)
            .with_message(format!("{table} callbacks are already registered"))
    }

    /// Creates a notifier setup error.
    #[must_use]
    pub fn notify_setup_failed(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotifySetupFailed).with_message(reason)
    }

    /// Creates a lock failure error.
    #[must_use]
    pub fn lock_failed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::LockFailed).with_message(detail)
    }

    /// Creates a condition failure error.
    #[must_use]
    pub fn condition_failed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConditionFailed).with_message(detail)
    }

    /// Creates an internal error (bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<BuildError> for Error {
    fn from(e: BuildError) -> Self {
        Self::new(ErrorKind::InvalidConfig)
            .with_message(e.to_string())
            .with_source(e)
    }
}

impl From<TryReserveError> for Error {
    fn from(e: TryReserveError) -> Self {
        Self::new(ErrorKind::OutOfMemory).with_source(e)
    }
}

/// A specialized Result type for evcore operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal");
    }

    #[test]
    fn display_with_message() {
        let err = Error::new(ErrorKind::NotInHeap).with_message("timer T3");
        assert_eq!(err.to_string(), "NotInHeap: timer T3");
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::new(ErrorKind::LockFailed)
            .with_message("outer")
            .with_source(Underlying);
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn categories() {
        assert_eq!(ErrorKind::OutOfMemory.category(), ErrorCategory::Heap);
        assert_eq!(
            ErrorKind::UnsupportedVersion.category(),
            ErrorCategory::Registration
        );
        assert_eq!(
            ErrorKind::PlatformUnsupported.category(),
            ErrorCategory::Platform
        );
        assert_eq!(ErrorKind::WouldBlock.category(), ErrorCategory::Primitive);
    }

    #[test]
    fn recoverability_classification() {
        assert!(ErrorKind::WouldBlock.is_retryable());
        assert!(ErrorKind::NotInHeap.recoverability().is_permanent());
        assert!(!ErrorKind::LockFailed.is_retryable());
    }

    #[test]
    fn try_reserve_error_maps_to_out_of_memory() {
        let mut v: Vec<u64> = Vec::new();
        let err: Error = v.try_reserve(usize::MAX).expect_err("must fail").into();
        assert_eq!(err.kind(), ErrorKind::OutOfMemory);
        assert!(err.source().is_some());
    }

    #[test]
    fn version_message_names_both_versions() {
        let err = Error::unsupported_version("lock", 1, 7);
        assert_eq!(err.kind(), ErrorKind::UnsupportedVersion);
        let msg = err.message().expect("message");
        assert!(msg.contains('1') && msg.contains('7'));
    }
}
