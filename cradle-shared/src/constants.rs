//! Constants shared between the supervisor and the launcher.
//!
//! Socket names and annotation keys are part of the external interface;
//! attach/exec clients depend on them staying stable across versions.

/// OCI runtime-spec version reported in the state document.
pub const OCI_VERSION: &str = "1.0.2";

/// State annotation keys.
pub mod annotations {
    /// Path of the attach socket within the instance directory.
    pub const ATTACH_SOCKET: &str = "io.ociruntime.attach-socket";

    /// Path of the control socket within the instance directory.
    pub const CONTROL_SOCKET: &str = "io.ociruntime.control-socket";
}

/// File names inside an instance directory.
pub mod files {
    /// Unix stream socket carrying the payload's output to attach clients.
    pub const ATTACH_SOCKET: &str = "attach.sock";

    /// Unix stream socket accepting control messages (resize, log reopen).
    pub const CONTROL_SOCKET: &str = "control.sock";

    /// Persisted container state document.
    pub const STATE: &str = "state.json";

    /// Suffix of the default container log file (`<id>.log`).
    pub const LOG_SUFFIX: &str = ".log";
}
