//! Cradle - supervisor side of the container process lifecycle.
//!
//! The supervisor coordinates start-up with the in-container launcher over
//! the handshake channel, owns the per-instance unix sockets, fans the
//! payload's output out to the container log and attached clients, and
//! services the out-of-band control channel.
//!
//! ## Architecture
//!
//! - `supervisor`: the create/start orchestration (`pre_start`,
//!   `post_start`, `stop`) and the SIGCHLD reaper
//! - `mux`: the stream multiplexer (fan-out, scrollback, attach clients)
//! - `control`: the JSON control server (resize, log reopen)
//! - `logger`: the container output log with pluggable line formats
//! - `instance`: the per-container instance directory and state persistence
//! - `streams`: pty/pipe endpoint allocation and supervisor-side ownership
//! - `handshake`: the supervisor's async end of the launcher handshake

pub mod control;
pub mod handshake;
pub mod hooks;
pub mod instance;
pub mod logger;
pub mod mux;
pub mod streams;
pub mod supervisor;

pub use cradle_shared::errors::{CradleError, CradleResult};
pub use handshake::{StartOutcome, SupervisorHandshake};
pub use logger::{LogFormat, Logger};
pub use streams::{ChildStreams, HostStreams, StreamPair};
pub use supervisor::{wait_for_exit, Supervisor, SupervisorConfig};
