//! Error handling for the attribute graph engine.
//!
//! Most invariant violations in this crate are *fatal preconditions*: they
//! indicate a corrupted graph and are not meant to be recovered from, so
//! they are reported through [`precondition_failure`] (which logs and then
//! panics) rather than through [`GraphError`]. `GraphError` is reserved for
//! the smaller set of genuinely recoverable failures: host-supplied
//! configuration, virtual-memory setup, and debug-server framing.

use std::io;
use thiserror::Error;
use tracing::error;

/// Result type for attrgraph operations.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors that can occur during graph setup or I/O, as opposed to the
/// fatal preconditions raised by [`precondition_failure`].
#[derive(Debug, Error)]
pub enum GraphError {
    /// I/O error from the arena's virtual-memory backing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A configuration value (environment variable or explicit override)
    /// could not be parsed or is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed data was read where well-formed data was expected, e.g. a
    /// truncated debug-server frame.
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// A registered type or key lookup failed.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A requested capability is not supported by this build.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(&'static str),
}

/// Raise a fatal precondition failure.
///
/// Mirrors the engine's "trap and abort the process" error tier (see
/// spec §7): these are invariant violations, not recoverable errors, so
/// callers never match on a `Result` here. The message is logged before
/// unwinding so it survives even if the panic is caught at a process
/// boundary.
#[track_caller]
pub fn precondition_failure(message: impl Into<String>) -> ! {
    let message = message.into();
    error!(precondition = %message, "fatal precondition failure");
    panic!("attrgraph: {message}");
}

/// Log (but do not abort on) a non-fatal precondition violation, per the
/// second tier of spec §7 — e.g. an access-from-multiple-threads check
/// that fires during teardown, where the graph is being torn down anyway.
pub fn report_precondition(message: impl std::fmt::Display) {
    tracing::warn!(precondition = %message, "non-fatal precondition violation");
}
