//! Control-socket message.
//!
//! One JSON object per connection. Missing fields mean "no change";
//! unknown fields are ignored. There is no response.

use serde::{Deserialize, Serialize};

/// Requested terminal dimensions, in character cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSize {
    pub width: u16,
    pub height: u16,
}

/// A control request. When both fields are present the resize is applied
/// before the log reopen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlMessage {
    /// Apply a new window size to the pty master, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_size: Option<ConsoleSize>,

    /// Reopen the container log's underlying file (log rotation).
    pub reopen_log: bool,
}

impl ControlMessage {
    /// A message with no fields is a no-op.
    pub fn is_noop(&self) -> bool {
        self.console_size.is_none() && !self.reopen_log
    }
}
