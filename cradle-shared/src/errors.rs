//! Error types for the cradle runtime core.
//!
//! Variants map onto the recovery path of each failure class:
//! - [`CradleError::Config`]: caller-supplied input is invalid (user-fixable)
//! - [`CradleError::Setup`]: supervisor-side start-up failed; start aborts
//! - [`CradleError::Launch`]: launcher-side failure; surfaced as its exit status
//! - [`CradleError::Hook`]: a lifecycle hook failed
//! - [`CradleError::State`]: invalid container state transition

use std::io;
use thiserror::Error;

/// Result alias used throughout the workspace.
pub type CradleResult<T> = Result<T, CradleError>;

/// Errors produced by the supervisor and launcher.
#[derive(Debug, Error)]
pub enum CradleError {
    /// Invalid caller-supplied configuration (cwd, args, rlimits, log format).
    #[error("config: {0}")]
    Config(String),

    /// Supervisor-side start-up failure (sockets, logger, pid file, state).
    #[error("setup: {0}")]
    Setup(String),

    /// Launcher-side failure (chdir, fd installation, security, exec).
    #[error("launch: {0}")]
    Launch(String),

    /// A lifecycle hook failed or timed out.
    #[error("hook: {0}")]
    Hook(String),

    /// Container state transition was rejected.
    #[error("state: {0}")]
    State(String),

    /// Generic IO error (catch-all).
    #[error("io: {0}")]
    Io(#[from] io::Error),
}
