//! Unified error handling for the feedwatch crate
//!
//! Two kinds of failure matter to the runtime core:
//!
//! - Configuration errors ([`Error::Config`]): name collisions, references
//!   to unknown modules, use of an explicitly-disabled module, invalid
//!   settings. Always fatal at startup and never caught by the scheduler.
//! - Recoverable operation errors: generic application-level failures
//!   ([`Error::App`]) and failures surfaced by the feed client
//!   ([`Error::Api`], [`Error::Http`]). The scheduler catches these around
//!   each job run, logs them with the run duration and reschedules the job.
//!
//! Any other error escaping a job action is intentionally fatal and
//! propagates out of the run loop; the expected recovery mechanism is a
//! process restart by the surrounding deployment environment.

use std::io;
use thiserror::Error;

pub use crate::feed::ApiError;

/// Unified error type for the feedwatch crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (duplicate names, unknown or disabled modules,
    /// invalid settings). Fatal at startup.
    #[error("Config error: {0}")]
    Config(String),

    /// Generic application-level failure raised by module code. Recoverable.
    #[error("{0}")]
    App(String),

    /// Feed API errors (bad status, malformed payload). Recoverable.
    #[error("Feed API error: {0}")]
    Api(#[from] ApiError),

    /// HTTP transport errors. Recoverable.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML settings file errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a recoverable application-level error
    pub fn app(msg: impl Into<String>) -> Self {
        Self::App(msg.into())
    }

    /// Check if this error is recoverable (the scheduler logs it and
    /// reschedules the job instead of terminating the run loop)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::App(_) | Self::Api(_) | Self::Http(_))
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
