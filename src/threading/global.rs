//! Optional process-wide threading configuration.
//!
//! Runtimes that pass [`Threading`] explicitly never need this. For code that
//! cannot thread a configuration through, one value may be installed per
//! process; it can never be replaced.

use crate::error::{Error, ErrorKind, Result};
use crate::threading::builder::Threading;
use crate::tracing_compat::debug;
use std::sync::OnceLock;

static GLOBAL: OnceLock<Threading> = OnceLock::new();

/// Installs the process-wide configuration.
///
/// Fails with `AlreadyInUse` if one is already installed.
pub fn install(threading: Threading) -> Result<()> {
    GLOBAL.set(threading).map_err(|_| {
        Error::new(ErrorKind::AlreadyInUse).with_message("global threading is already installed")
    })?;
    debug!("global threading installed");
    Ok(())
}

/// Returns the process-wide configuration, if installed.
#[must_use]
pub fn get() -> Option<&'static Threading> {
    GLOBAL.get()
}
