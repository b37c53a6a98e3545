//! Environment variable and config file support for [`RuntimeBuilder`](super::builder::RuntimeBuilder).
//!
//! # Configuration Precedence
//!
//! Every source overwrites only the fields it sets, and a later application
//! wins over an earlier one. Chaining the sources in this order gives the
//! usual precedence (highest priority first):
//!
//! 1. **Programmatic**: builder methods called last (`debug_locks(true)`)
//! 2. **Environment variables**: [`RuntimeBuilder::with_env_overrides`](super::builder::RuntimeBuilder::with_env_overrides)
//! 3. **Config file**: [`RuntimeBuilder::from_toml`](super::builder::RuntimeBuilder::from_toml) (requires `config-file` feature)
//! 4. **Defaults**: built-in defaults from [`RuntimeConfig::default()`]
//!
//! ```rust,ignore
//! let runtime = RuntimeBuilder::from_toml("evcore.toml")?
//!     .with_env_overrides()?
//!     .debug_locks(true)
//!     .build()?;
//! ```
//!
//! A builder method called *before* `with_env_overrides` is replaced by any
//! matching `EVCORE_*` variable.
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `EVCORE_TIMER_HEAP_CAPACITY` | `usize` | `timer_heap.initial_capacity` |
//! | `EVCORE_TIMER_HEAP_MAX_CAPACITY` | `usize` | `timer_heap.max_capacity` (0 = unbounded) |
//! | `EVCORE_PLATFORM_THREADS` | `bool` | `platform_threads` |
//! | `EVCORE_DEBUG_LOCKS` | `bool` | `debug_locks` |
//! | `EVCORE_LOCK_VIOLATION` | `abort` / `panic` | `violation_response` |

use crate::runtime::config::RuntimeConfig;
use crate::threading::ViolationResponse;
use crate::types::builder::BuildError;

/// Environment variable name for the initial timer heap capacity.
pub const ENV_TIMER_HEAP_CAPACITY: &str = "EVCORE_TIMER_HEAP_CAPACITY";
/// Environment variable name for the timer heap capacity bound.
pub const ENV_TIMER_HEAP_MAX_CAPACITY: &str = "EVCORE_TIMER_HEAP_MAX_CAPACITY";
/// Environment variable name for the built-in threading toggle.
pub const ENV_PLATFORM_THREADS: &str = "EVCORE_PLATFORM_THREADS";
/// Environment variable name for the lock debugging toggle.
pub const ENV_DEBUG_LOCKS: &str = "EVCORE_DEBUG_LOCKS";
/// Environment variable name for the lock violation response.
pub const ENV_LOCK_VIOLATION: &str = "EVCORE_LOCK_VIOLATION";

/// Apply environment variable overrides to a [`RuntimeConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut RuntimeConfig) -> Result<(), BuildError> {
    if let Some(val) = read_env(ENV_TIMER_HEAP_CAPACITY) {
        config.timer_heap.initial_capacity = parse_usize(ENV_TIMER_HEAP_CAPACITY, &val)?;
    }
    if let Some(val) = read_env(ENV_TIMER_HEAP_MAX_CAPACITY) {
        config.timer_heap.max_capacity =
            unbounded_if_zero(parse_usize(ENV_TIMER_HEAP_MAX_CAPACITY, &val)?);
    }
    if let Some(val) = read_env(ENV_PLATFORM_THREADS) {
        config.platform_threads = parse_bool(ENV_PLATFORM_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_DEBUG_LOCKS) {
        config.debug_locks = parse_bool(ENV_DEBUG_LOCKS, &val)?;
    }
    if let Some(val) = read_env(ENV_LOCK_VIOLATION) {
        config.violation_response = parse_violation(ENV_LOCK_VIOLATION, &val)?;
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn unbounded_if_zero(n: usize) -> Option<usize> {
    (n > 0).then_some(n)
}

fn parse_usize(var_name: &str, val: &str) -> Result<usize, BuildError> {
    val.trim().parse::<usize>().map_err(|e| {
        BuildError::custom(format!(
            "invalid value for {var_name}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

fn parse_bool(var_name: &str, val: &str) -> Result<bool, BuildError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(BuildError::custom(format!(
            "invalid value for {var_name}: expected bool (true/false/1/0/yes/no), got {val:?}"
        ))),
    }
}

fn parse_violation(var_name: &str, val: &str) -> Result<ViolationResponse, BuildError> {
    val.parse::<ViolationResponse>().map_err(|e| {
        BuildError::custom(format!("invalid value for {var_name}: {e} ({val:?})"))
    })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable runtime configuration.
///
/// Fields are grouped into TOML tables:
///
/// ```toml
/// [timers]
/// initial_capacity = 64
/// max_capacity = 65536
///
/// [threading]
/// platform = true
/// debug_locks = true
/// violation = "panic"
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct RuntimeTomlConfig {
    /// Timer heap settings.
    #[serde(default)]
    pub timers: TimersToml,
    /// Threading provider settings.
    #[serde(default)]
    pub threading: ThreadingToml,
}

/// Timers section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct TimersToml {
    /// Slots reserved when a timer queue is created.
    pub initial_capacity: Option<usize>,
    /// Upper bound on timer heap slots (0 = unbounded).
    pub max_capacity: Option<usize>,
}

/// Threading section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct ThreadingToml {
    /// Register the built-in providers.
    pub platform: Option<bool>,
    /// Wrap providers in the debugging decorators.
    pub debug_locks: Option<bool>,
    /// `"abort"` or `"panic"`.
    pub violation: Option<ViolationResponse>,
}

/// Apply a parsed TOML config to a [`RuntimeConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut RuntimeConfig, toml: &RuntimeTomlConfig) {
    if let Some(v) = toml.timers.initial_capacity {
        config.timer_heap.initial_capacity = v;
    }
    if let Some(v) = toml.timers.max_capacity {
        config.timer_heap.max_capacity = unbounded_if_zero(v);
    }
    if let Some(v) = toml.threading.platform {
        config.platform_threads = v;
    }
    if let Some(v) = toml.threading.debug_locks {
        config.debug_locks = v;
    }
    if let Some(v) = toml.threading.violation {
        config.violation_response = v;
    }
}

/// Parse a TOML string into a [`RuntimeTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<RuntimeTomlConfig, BuildError> {
    toml::from_str(toml_str)
        .map_err(|e| BuildError::custom(format!("failed to parse TOML config: {e}")))
}

/// Read and parse a TOML file into a [`RuntimeTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<RuntimeTomlConfig, BuildError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        BuildError::custom(format!(
            "failed to read config file {}: {e}",
            path.display()
        ))
    })?;
    parse_toml_str(&content)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: [&str; 5] = [
        ENV_TIMER_HEAP_CAPACITY,
        ENV_TIMER_HEAP_MAX_CAPACITY,
        ENV_PLATFORM_THREADS,
        ENV_DEBUG_LOCKS,
        ENV_LOCK_VIOLATION,
    ];

    fn with_envs<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = crate::test_utils::env_lock();
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
        for (k, v) in vars {
            std::env::set_var(k, v);
        }
        let result = f();
        for (k, _) in vars {
            std::env::remove_var(k);
        }
        result
    }

    fn with_env<F, R>(var: &str, val: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        with_envs(&[(var, val)], f)
    }

    // --- parse helpers ---

    #[test]
    fn parse_usize_valid() {
        assert_eq!(super::parse_usize("TEST", "42").unwrap(), 42);
        assert_eq!(super::parse_usize("TEST", " 100 ").unwrap(), 100);
        assert_eq!(super::parse_usize("TEST", "0").unwrap(), 0);
    }

    #[test]
    fn parse_usize_invalid() {
        assert!(super::parse_usize("TEST", "abc").is_err());
        assert!(super::parse_usize("TEST", "-1").is_err());
        assert!(super::parse_usize("TEST", "").is_err());
    }

    #[test]
    fn parse_bool_all_truthy() {
        for val in &["true", "1", "yes", "on", "TRUE", "Yes", "ON"] {
            assert!(
                super::parse_bool("TEST", val).unwrap(),
                "expected true for {val}"
            );
        }
    }

    #[test]
    fn parse_bool_all_falsy() {
        for val in &["false", "0", "no", "off", "FALSE", "No", "OFF"] {
            assert!(
                !super::parse_bool("TEST", val).unwrap(),
                "expected false for {val}"
            );
        }
    }

    #[test]
    fn parse_bool_invalid() {
        assert!(super::parse_bool("TEST", "maybe").is_err());
        assert!(super::parse_bool("TEST", "2").is_err());
    }

    #[test]
    fn parse_violation_values() {
        assert_eq!(
            super::parse_violation("TEST", "Panic").unwrap(),
            ViolationResponse::Panic
        );
        assert_eq!(
            super::parse_violation("TEST", "abort").unwrap(),
            ViolationResponse::Abort
        );
        assert!(super::parse_violation("TEST", "ignore").is_err());
    }

    // --- apply_env_overrides ---

    #[test]
    fn env_overrides_timer_heap() {
        with_envs(
            &[
                (ENV_TIMER_HEAP_CAPACITY, "32"),
                (ENV_TIMER_HEAP_MAX_CAPACITY, "1024"),
            ],
            || {
                let mut config = RuntimeConfig::default();
                apply_env_overrides(&mut config).unwrap();
                assert_eq!(config.timer_heap.initial_capacity, 32);
                assert_eq!(config.timer_heap.max_capacity, Some(1024));
            },
        );
    }

    #[test]
    fn env_zero_max_capacity_means_unbounded() {
        with_env(ENV_TIMER_HEAP_MAX_CAPACITY, "0", || {
            let mut config = RuntimeConfig::default();
            config.timer_heap.max_capacity = Some(8);
            apply_env_overrides(&mut config).unwrap();
            assert_eq!(config.timer_heap.max_capacity, None);
        });
    }

    #[test]
    fn env_overrides_threading() {
        with_envs(
            &[
                (ENV_PLATFORM_THREADS, "off"),
                (ENV_DEBUG_LOCKS, "yes"),
                (ENV_LOCK_VIOLATION, "panic"),
            ],
            || {
                let mut config = RuntimeConfig::default();
                apply_env_overrides(&mut config).unwrap();
                assert!(!config.platform_threads);
                assert!(config.debug_locks);
                assert_eq!(config.violation_response, ViolationResponse::Panic);
            },
        );
    }

    #[test]
    fn env_overrides_unset_vars_leave_defaults() {
        with_envs(&[], || {
            let mut config = RuntimeConfig::default();
            apply_env_overrides(&mut config).unwrap();
            assert_eq!(config, RuntimeConfig::default());
        });
    }

    #[test]
    fn env_overrides_invalid_value_returns_error() {
        with_env(ENV_TIMER_HEAP_CAPACITY, "lots", || {
            let mut config = RuntimeConfig::default();
            let msg = apply_env_overrides(&mut config).unwrap_err().to_string();
            assert!(
                msg.contains(ENV_TIMER_HEAP_CAPACITY),
                "error should mention var name: {msg}"
            );
            assert!(msg.contains("lots"), "error should mention bad value: {msg}");
        });
    }

    #[test]
    fn env_overrides_invalid_violation_returns_error() {
        with_env(ENV_LOCK_VIOLATION, "shrug", || {
            let mut config = RuntimeConfig::default();
            let msg = apply_env_overrides(&mut config).unwrap_err().to_string();
            assert!(msg.contains(ENV_LOCK_VIOLATION));
        });
    }
}

#[cfg(all(test, feature = "config-file"))]
mod toml_tests {
    use super::*;

    #[test]
    fn parse_toml_full_config() {
        let toml_str = r#"
[timers]
initial_capacity = 64
max_capacity = 4096

[threading]
platform = true
debug_locks = true
violation = "panic"
"#;
        let parsed = parse_toml_str(toml_str).unwrap();
        assert_eq!(parsed.timers.initial_capacity, Some(64));
        assert_eq!(parsed.timers.max_capacity, Some(4096));
        assert_eq!(parsed.threading.platform, Some(true));
        assert_eq!(parsed.threading.debug_locks, Some(true));
        assert_eq!(parsed.threading.violation, Some(ViolationResponse::Panic));
    }

    #[test]
    fn parse_toml_empty_config() {
        let parsed = parse_toml_str("").unwrap();
        assert_eq!(parsed.timers.initial_capacity, None);
        assert_eq!(parsed.threading.violation, None);
    }

    #[test]
    fn parse_toml_invalid_syntax() {
        let msg = parse_toml_str("not valid toml {{{{").unwrap_err().to_string();
        assert!(msg.contains("TOML"));
    }

    #[test]
    fn parse_toml_rejects_unknown_keys() {
        assert!(parse_toml_str("[timers]\nworker_threads = 4\n").is_err());
    }

    #[test]
    fn parse_toml_rejects_unknown_violation() {
        assert!(parse_toml_str("[threading]\nviolation = \"log\"\n").is_err());
    }

    #[test]
    fn apply_toml_overrides_config() {
        let parsed = parse_toml_str("[timers]\nmax_capacity = 0\n[threading]\ndebug_locks = true\n")
            .unwrap();
        let mut config = RuntimeConfig::default();
        config.timer_heap.max_capacity = Some(8);
        apply_toml_config(&mut config, &parsed);

        assert_eq!(config.timer_heap.max_capacity, None);
        assert!(config.debug_locks);
        // Unset fields remain at defaults.
        assert_eq!(
            config.violation_response,
            RuntimeConfig::default().violation_response
        );
    }

    #[test]
    fn toml_file_not_found() {
        let result = parse_toml_file(std::path::Path::new("/nonexistent/evcore.toml"));
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("failed to read"));
    }

    #[test]
    fn toml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evcore.toml");
        std::fs::write(&path, "[timers]\ninitial_capacity = 16\n").unwrap();

        let parsed = parse_toml_file(&path).unwrap();
        let mut config = RuntimeConfig::default();
        apply_toml_config(&mut config, &parsed);
        assert_eq!(config.timer_heap.initial_capacity, 16);
    }
}
