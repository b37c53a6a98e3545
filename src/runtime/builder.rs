//! Runtime builder and handles.

use crate::error::Result;
use crate::runtime::config::RuntimeConfig;
use crate::runtime::shared_timer::SharedTimerQueue;
use crate::threading::{Threading, ThreadingBuilder, ViolationResponse};
use crate::tracing_compat::debug;
use crate::types::builder::BuildError;
use std::sync::Arc;

/// Builder for constructing a runtime with custom configuration.
#[derive(Clone, Debug)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    threading: Option<Threading>,
}

impl RuntimeBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RuntimeConfig::default(),
            threading: None,
        }
    }

    /// Set the number of slots every timer queue reserves up front.
    #[must_use]
    pub fn timer_heap_capacity(mut self, n: usize) -> Self {
        self.config.timer_heap.initial_capacity = n;
        self
    }

    /// Bound the number of pending timers per queue.
    #[must_use]
    pub fn max_timer_heap_capacity(mut self, max: usize) -> Self {
        self.config.timer_heap.max_capacity = Some(max);
        self
    }

    /// Register (or skip) the built-in threading providers.
    #[must_use]
    pub fn platform_threads(mut self, enable: bool) -> Self {
        self.config.platform_threads = enable;
        self
    }

    /// Make lock misuse fatal.
    #[must_use]
    pub fn debug_locks(mut self, enable: bool) -> Self {
        self.config.debug_locks = enable;
        self
    }

    /// Choose what lock debugging does on a violation.
    #[must_use]
    pub fn violation_response(mut self, response: ViolationResponse) -> Self {
        self.config.violation_response = response;
        self
    }

    /// Use an already negotiated [`Threading`] instead of building one from
    /// the `platform_threads` and `debug_locks` settings.
    #[must_use]
    pub fn threading(mut self, threading: Threading) -> Self {
        self.threading = Some(threading);
        self
    }

    /// Apply `EVCORE_*` environment variables on top of the current settings.
    ///
    /// Variables that are set replace whatever the builder holds so far.
    /// Call setters afterwards for them to take priority over the environment.
    pub fn with_env_overrides(mut self) -> core::result::Result<Self, BuildError> {
        super::env_config::apply_env_overrides(&mut self.config)?;
        Ok(self)
    }

    /// Start from a TOML config file.
    #[cfg(feature = "config-file")]
    pub fn from_toml(path: impl AsRef<std::path::Path>) -> core::result::Result<Self, BuildError> {
        let parsed = super::env_config::parse_toml_file(path.as_ref())?;
        let mut builder = Self::new();
        super::env_config::apply_toml_config(&mut builder.config, &parsed);
        Ok(builder)
    }

    /// Start from TOML source text.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(toml: &str) -> core::result::Result<Self, BuildError> {
        let parsed = super::env_config::parse_toml_str(toml)?;
        let mut builder = Self::new();
        super::env_config::apply_toml_config(&mut builder.config, &parsed);
        Ok(builder)
    }

    /// Build a runtime from this configuration.
    pub fn build(self) -> Result<Runtime> {
        let Self { config, threading } = self;
        match threading {
            Some(threading) => Runtime::with_threading(config, threading),
            None => Runtime::with_config(config),
        }
    }

    /// Single-threaded preset: no lock providers at all.
    #[must_use]
    pub fn current_thread() -> Self {
        Self::new().platform_threads(false)
    }

    /// Development preset: platform providers with lock debugging that
    /// panics instead of aborting.
    #[must_use]
    pub fn debug() -> Self {
        Self::new()
            .debug_locks(true)
            .violation_response(ViolationResponse::Panic)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Runtime instance created from a [`RuntimeBuilder`].
///
/// Cheap to clone; clones share the negotiated threading providers.
#[derive(Clone, Debug)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

#[derive(Debug)]
struct RuntimeInner {
    config: RuntimeConfig,
    threading: Threading,
}

impl Runtime {
    /// Construct a runtime from the given configuration.
    pub fn with_config(mut config: RuntimeConfig) -> Result<Self> {
        config.normalize();
        config.validate()?;
        let threading = threading_from_config(&config)?;
        Ok(Self::assemble(config, threading))
    }

    /// Construct a runtime around providers negotiated elsewhere.
    ///
    /// Lock debugging cannot be added after the fact, so asking for it with
    /// a non-debugging `threading` is rejected.
    pub fn with_threading(mut config: RuntimeConfig, threading: Threading) -> Result<Self> {
        config.normalize();
        config.validate()?;
        if config.debug_locks && !threading.is_debugging() {
            return Err(BuildError::conflicting_options("debug_locks", "threading").into());
        }
        config.debug_locks = threading.is_debugging();
        config.platform_threads = false;
        Ok(Self::assemble(config, threading))
    }

    fn assemble(config: RuntimeConfig, threading: Threading) -> Self {
        debug!(
            locking = threading.has_locking(),
            debug_locks = threading.is_debugging(),
            initial_capacity = config.timer_heap.initial_capacity,
            "runtime built"
        );
        Self {
            inner: Arc::new(RuntimeInner { config, threading }),
        }
    }

    /// Returns a reference to the runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Returns the negotiated threading providers.
    #[must_use]
    pub fn threading(&self) -> &Threading {
        &self.inner.threading
    }

    /// Creates a timer queue sized by this runtime's configuration.
    ///
    /// The queue is made notifiable whenever both lock and condition
    /// providers are available.
    pub fn timer_queue(&self) -> Result<SharedTimerQueue> {
        let threading = &self.inner.threading;
        let queue = SharedTimerQueue::new(threading, self.inner.config.timer_heap)?;
        if threading.has_locking() && threading.has_conditions() {
            threading.make_notifiable(&queue)?;
        }
        Ok(queue)
    }
}

fn threading_from_config(config: &RuntimeConfig) -> Result<Threading> {
    let mut builder = ThreadingBuilder::new().violation_response(config.violation_response);
    if config.platform_threads {
        builder = builder.use_platform_threads()?;
    }
    if config.debug_locks {
        builder = builder.enable_lock_debugging();
    }
    Ok(builder.build())
}
