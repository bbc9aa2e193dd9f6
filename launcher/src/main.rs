//! Entry point for the cradle launcher binary.
//!
//! The supervisor (or its driver) forks this binary inside the prepared
//! container environment, passing the serialized launcher configuration and
//! the inherited handshake fd.

use clap::Parser;
use cradle_shared::errors::{CradleError, CradleResult};
use cradle_shared::handshake::LauncherHandshake;
use cradle_shared::process::LauncherConfig;
use launcher::PermitAll;
use std::convert::Infallible;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

/// Cradle launcher - finalizes the container environment and execs the payload
#[derive(Parser, Debug)]
#[command(author, version, about = "Cradle launcher - in-container side of the runtime")]
struct LauncherArgs {
    /// Path to the JSON launcher configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Inherited fd carrying the supervisor handshake channel
    #[arg(long)]
    handshake_fd: RawFd,
}

fn main() {
    // Diagnostics go to stderr; before stdio installation that is still the
    // fd inherited from the driver, afterwards the payload's stderr.
    if tracing_subscriber::fmt()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("error")),
        )
        .try_init()
        .is_err()
    {
        eprintln!("[cradle-launcher] failed to initialize tracing");
    }

    let args = LauncherArgs::parse();

    match launch(args) {
        Ok(never) => match never {},
        Err(e) => {
            tracing::error!("launcher failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn launch(args: LauncherArgs) -> CradleResult<Infallible> {
    let raw = std::fs::read(&args.config).map_err(|e| {
        CradleError::Config(format!(
            "reading launcher config {}: {}",
            args.config.display(),
            e
        ))
    })?;
    let config: LauncherConfig = serde_json::from_slice(&raw)
        .map_err(|e| CradleError::Config(format!("decoding launcher config: {}", e)))?;

    // SAFETY: the fd was opened by the supervisor and inherited across fork;
    // nothing else in this process uses it.
    let mut handshake = unsafe { LauncherHandshake::from_raw_fd(args.handshake_fd) };

    launcher::run(&mut handshake, &config, &PermitAll)
}
