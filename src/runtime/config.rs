//! Runtime configuration types.
//!
//! These types hold the concrete values that drive runtime behavior. In most
//! cases you should use [`RuntimeBuilder`](super::builder::RuntimeBuilder) to
//! construct a runtime rather than creating a [`RuntimeConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `timer_heap.initial_capacity` | 0 (allocate on first insert) |
//! | `timer_heap.max_capacity` | `None` (bounded by the heap slot range) |
//! | `platform_threads` | true when the `platform-threads` feature is on |
//! | `debug_locks` | false |
//! | `violation_response` | `Abort` |

use crate::runtime::timer_heap::TimerHeapConfig;
use crate::threading::ViolationResponse;
use crate::types::builder::BuildError;

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Sizing for every timer queue the runtime creates.
    pub timer_heap: TimerHeapConfig,
    /// Register the built-in lock, condition and thread-id providers.
    pub platform_threads: bool,
    /// Wrap the lock and condition providers in the debugging decorators.
    pub debug_locks: bool,
    /// What the debugging decorators do on a contract violation.
    pub violation_response: ViolationResponse,
}

impl RuntimeConfig {
    /// Normalize configuration values to safe defaults.
    ///
    /// A zero `max_capacity` can never hold a timer; it is treated as unbounded.
    pub fn normalize(&mut self) {
        if self.timer_heap.max_capacity == Some(0) {
            self.timer_heap.max_capacity = None;
        }
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), BuildError> {
        if let Some(max) = self.timer_heap.max_capacity {
            if self.timer_heap.initial_capacity > max {
                return Err(BuildError::invalid_range(
                    "timer_heap_capacity",
                    self.timer_heap.initial_capacity as u64,
                    max as u64,
                ));
            }
        }
        if self.platform_threads && !cfg!(feature = "platform-threads") {
            return Err(BuildError::invalid_value(
                "platform_threads",
                "evcore was built without the `platform-threads` feature",
            ));
        }
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timer_heap: TimerHeapConfig::default(),
            platform_threads: cfg!(feature = "platform-threads"),
            debug_locks: false,
            violation_response: ViolationResponse::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.timer_heap.initial_capacity, 0);
        assert_eq!(config.timer_heap.max_capacity, None);
        assert!(!config.debug_locks);
        assert_eq!(config.violation_response, ViolationResponse::Abort);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn normalize_zero_max_is_unbounded() {
        let mut config = RuntimeConfig::default();
        config.timer_heap.max_capacity = Some(0);
        config.normalize();
        assert_eq!(config.timer_heap.max_capacity, None);
    }

    #[test]
    fn initial_above_max_is_rejected() {
        let mut config = RuntimeConfig::default();
        config.timer_heap.initial_capacity = 64;
        config.timer_heap.max_capacity = Some(16);
        let err = config.validate().expect_err("range");
        assert_eq!(err, BuildError::invalid_range("timer_heap_capacity", 64, 16));
    }

    #[cfg(not(feature = "platform-threads"))]
    #[test]
    fn platform_threads_without_feature_is_rejected() {
        let mut config = RuntimeConfig::default();
        config.platform_threads = true;
        assert_eq!(config.validate().expect_err("feature").field(), Some("platform_threads"));
    }
}
