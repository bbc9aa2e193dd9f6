//! Container state document and lifecycle status machine.
//!
//! The state document follows the OCI runtime-spec "State" shape and is
//! what gets persisted to the instance directory and piped to lifecycle
//! hooks on stdin.

use crate::constants::OCI_VERSION;
use crate::errors::{CradleError, CradleResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Lifecycle status of a container.
///
/// Status only ever advances, in this order:
/// ```text
/// creating → created → running → stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Supervisor-side setup is in progress; the launcher is paused.
    Creating,

    /// Setup finished: sockets, logger and pid file exist, hooks ran.
    Created,

    /// The payload has replaced the launcher.
    Running,

    /// The payload exited and was reaped.
    Stopped,
}

impl Status {
    /// Check if a transition to `target` is valid. Status is monotone;
    /// skipping a step is allowed (a payload that dies during start goes
    /// straight to `Stopped`), going backwards is not.
    pub fn can_transition_to(&self, target: Status) -> bool {
        (target as u8) > (*self as u8)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Creating => "creating",
            Status::Created => "created",
            Status::Running => "running",
            Status::Stopped => "stopped",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(Status::Creating),
            "created" => Ok(Status::Created),
            "running" => Ok(Status::Running),
            "stopped" => Ok(Status::Stopped),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-container state, persisted as JSON in the instance directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "ociVersion")]
    pub oci_version: String,

    pub id: String,

    pub status: Status,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,

    pub bundle: PathBuf,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ContainerState {
    /// Create the initial state for a container about to be set up.
    pub fn new(id: impl Into<String>, bundle: impl Into<PathBuf>) -> Self {
        Self {
            oci_version: OCI_VERSION.to_string(),
            id: id.into(),
            status: Status::Creating,
            pid: None,
            bundle: bundle.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Advance the status, validating monotonicity.
    ///
    /// A transition to `Created` or beyond requires the pid to be set.
    pub fn transition_to(&mut self, target: Status) -> CradleResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(CradleError::State(format!(
                "cannot transition from {} to {}",
                self.status, target
            )));
        }
        if target != Status::Creating && self.pid.is_none() {
            return Err(CradleError::State(format!(
                "cannot publish {} without a pid",
                target
            )));
        }
        self.status = target;
        Ok(())
    }

    pub fn set_pid(&mut self, pid: i32) {
        self.pid = Some(pid);
    }

    pub fn set_annotation(&mut self, key: &str, value: impl Into<String>) {
        self.annotations.insert(key.to_string(), value.into());
    }
}
