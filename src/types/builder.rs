//! Builder error types.
//!
//! Builders in this crate are move-based: each setter takes `self` and
//! returns `Self`, and validation of cross-field constraints happens in
//! `build()`. Environment and file overrides report malformed input through
//! the same [`BuildError`] type.
//!
//! ```ignore
//! let runtime = RuntimeBuilder::new()
//!     .timer_heap_capacity(64)
//!     .max_timer_heap_capacity(4096)
//!     .build()?;
//! ```

use core::fmt;

/// Errors that can occur when building a configuration.
///
/// | Category | Description | Example |
/// |----------|-------------|---------|
/// | `InvalidValue` | Value fails validation | unparseable env var |
/// | `InvalidRange` | Range constraints violated | initial capacity > max capacity |
/// | `ConflictingOptions` | Mutually exclusive options | lock debugging without any lock provider |
/// | `Custom` | Anything else | TOML parse failure |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// A field value failed validation.
    InvalidValue {
        /// The field that failed validation.
        field: &'static str,
        /// Why the value is invalid.
        reason: String,
    },

    /// A range constraint was violated (min > max).
    InvalidRange {
        /// The field or field pair with the range issue.
        field: &'static str,
        /// The minimum value provided.
        min: u64,
        /// The maximum value provided.
        max: u64,
    },

    /// Two options that cannot both be enabled were set.
    ConflictingOptions {
        /// The first conflicting option.
        option_a: &'static str,
        /// The second conflicting option.
        option_b: &'static str,
    },

    /// A custom validation error with arbitrary message.
    Custom {
        /// The error message.
        message: String,
    },
}

impl BuildError {
    /// Creates an `InvalidValue` error.
    #[must_use]
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidRange` error.
    #[must_use]
    pub const fn invalid_range(field: &'static str, min: u64, max: u64) -> Self {
        Self::InvalidRange { field, min, max }
    }

    /// Creates a `ConflictingOptions` error.
    #[must_use]
    pub const fn conflicting_options(option_a: &'static str, option_b: &'static str) -> Self {
        Self::ConflictingOptions { option_a, option_b }
    }

    /// Creates a `Custom` error.
    #[must_use]
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }

    /// Returns the field name associated with this error, if any.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidValue { field, .. } | Self::InvalidRange { field, .. } => Some(field),
            Self::ConflictingOptions { .. } | Self::Custom { .. } => None,
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => {
                write!(f, "invalid {field}: {reason}")
            }
            Self::InvalidRange { field, min, max } => {
                write!(
                    f,
                    "invalid {field} range: min ({min}) must be <= max ({max})"
                )
            }
            Self::ConflictingOptions { option_a, option_b } => {
                write!(
                    f,
                    "conflicting options: {option_a} and {option_b} cannot both be enabled"
                )
            }
            Self::Custom { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for BuildError {}

/// Result type for builder operations.
pub type BuildResult<T> = Result<T, BuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = BuildError::invalid_range("timer_heap_capacity", 64, 8);
        assert_eq!(
            err.to_string(),
            "invalid timer_heap_capacity range: min (64) must be <= max (8)"
        );
        assert_eq!(err.field(), Some("timer_heap_capacity"));

        let err = BuildError::conflicting_options("debug_locks", "no_lock_provider");
        assert!(err.field().is_none());
        assert!(err.to_string().contains("debug_locks"));
    }
}
