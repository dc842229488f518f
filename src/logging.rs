//! Logging setup for host applications embedding the engine.
//!
//! The engine itself only ever emits `tracing` events; it never installs a
//! subscriber on its own. This module is a convenience for hosts (and for
//! `agctl`) that want a reasonable default.

use crate::error::{GraphError, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Install a global `tracing` subscriber filtered by `level` (an
/// `EnvFilter` directive string, e.g. `"attrgraph=debug"`).
///
/// Returns an error rather than panicking if a subscriber has already been
/// installed, since that is a legitimate situation in test binaries that
/// call this more than once.
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| GraphError::InvalidArgument(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| GraphError::InvalidArgument("logging already initialized".into()))
}
