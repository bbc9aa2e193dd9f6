//! Caller-supplied process inputs and the launcher configuration.
//!
//! These types cross the supervisor/launcher boundary: the supervisor
//! serializes a [`LauncherConfig`] for the launcher binary, which inherits
//! the handshake channel and the stream fds by number.

use serde::{Deserialize, Serialize};
use std::os::unix::io::RawFd;
use std::path::PathBuf;

/// What to run inside the container and how.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Working directory of the payload. Empty means `/`; anything else
    /// must be absolute.
    #[serde(default)]
    pub cwd: String,

    /// Payload argv. `args[0]` is resolved against `PATH` from `env`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Environment as ordered `KEY=VALUE` entries.
    #[serde(default)]
    pub env: Vec<String>,

    /// Allocate a pty pair instead of stdout/stderr pipes.
    #[serde(default)]
    pub terminal: bool,

    /// Resource limits applied by the launcher, in order.
    #[serde(default)]
    pub rlimits: Vec<Rlimit>,

    /// Lifecycle hooks, grouped by phase. Absent means no hooks run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hooks: Option<Hooks>,
}

/// A single resource limit. `kind` is the `RLIMIT_*` name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rlimit {
    #[serde(rename = "type")]
    pub kind: String,
    pub soft: u64,
    pub hard: u64,
}

/// Lifecycle hooks by phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default)]
    pub prestart: Vec<Hook>,
    #[serde(default)]
    pub poststart: Vec<Hook>,
    #[serde(default)]
    pub poststop: Vec<Hook>,
}

/// An external program invoked at a lifecycle phase with the container
/// state document on stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub path: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Stream endpoints inherited by the launcher, described by fd number.
///
/// The fds are allocated by the supervisor before the launcher is forked,
/// so the numbers are valid in both processes. Write-end ownership passes
/// to the launcher at fork; the supervisor keeps the read ends (or the pty
/// master) for the container's lifetime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Stdio {
    /// One pty pair; the slave becomes fds 0/1/2 and the controlling
    /// terminal of the payload.
    Terminal { master_fd: RawFd, slave_fd: RawFd },

    /// Two pipes; the write ends become fds 1/2, stdin is closed.
    Pipes {
        output_read: RawFd,
        output_write: RawFd,
        error_read: RawFd,
        error_write: RawFd,
    },
}

/// Full configuration handed to the launcher binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub process: ProcessSpec,

    /// Stream endpoints. `None` leaves the inherited fds untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdio: Option<Stdio>,

    /// Run no payload; pause, then sit in a signal loop reaping children.
    #[serde(default)]
    pub empty_process: bool,

    /// Skip the supervisor handshake entirely (plain exec).
    #[serde(default)]
    pub pure_exec: bool,
}
