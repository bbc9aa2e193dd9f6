//! In-container launcher for the cradle runtime.
//!
//! The launcher runs inside the pre-prepared container environment. It
//! finalizes the process environment (cwd, rlimits, stdio, security),
//! rendezvouses with the supervisor over the handshake channel, and then
//! replaces itself with the payload.

#[cfg(not(target_os = "linux"))]
compile_error!("the cradle launcher is Linux-only; build with a Linux target");

pub mod rlimit;
pub mod security;
pub mod start;
pub mod stdio;

pub use security::{PermitAll, SecurityConfigurator};
pub use start::run;
