//! Cradle shared types - common code for the supervisor and the launcher.
//!
//! This crate contains the types that cross the supervisor/launcher process
//! boundary: the container state document, the caller-supplied process spec,
//! the handshake wire protocol, and the control-socket message.

pub mod constants;
pub mod control;
pub mod errors;
pub mod handshake;
pub mod process;
pub mod state;

pub use control::{ConsoleSize, ControlMessage};
pub use errors::{CradleError, CradleResult};
pub use process::{Hook, Hooks, LauncherConfig, ProcessSpec, Rlimit, Stdio};
pub use state::{ContainerState, Status};
