//! Resource limit application.
//!
//! Limits are applied in the order supplied. A `RLIMIT_*` kind may appear
//! at most once; a repeat is reported after its (redundant) application and
//! nothing after it is applied.

use cradle_shared::errors::{CradleError, CradleResult};
use cradle_shared::process::Rlimit;
use nix::sys::resource::{setrlimit, Resource};

/// Apply the spec's rlimits via `setrlimit(2)`.
pub fn apply_rlimits(rlimits: &[Rlimit]) -> CradleResult<()> {
    let mut applied: Vec<&str> = Vec::with_capacity(rlimits.len());

    for rl in rlimits {
        let resource = resource_by_name(&rl.kind)?;
        setrlimit(resource, rl.soft, rl.hard).map_err(|e| {
            CradleError::Launch(format!("setting {} to {}/{}: {}", rl.kind, rl.soft, rl.hard, e))
        })?;
        if applied.iter().any(|kind| *kind == rl.kind) {
            return Err(CradleError::Config(format!("{} was already set", rl.kind)));
        }
        applied.push(&rl.kind);
    }

    Ok(())
}

fn resource_by_name(kind: &str) -> CradleResult<Resource> {
    let resource = match kind {
        "RLIMIT_AS" => Resource::RLIMIT_AS,
        "RLIMIT_CORE" => Resource::RLIMIT_CORE,
        "RLIMIT_CPU" => Resource::RLIMIT_CPU,
        "RLIMIT_DATA" => Resource::RLIMIT_DATA,
        "RLIMIT_FSIZE" => Resource::RLIMIT_FSIZE,
        "RLIMIT_LOCKS" => Resource::RLIMIT_LOCKS,
        "RLIMIT_MEMLOCK" => Resource::RLIMIT_MEMLOCK,
        "RLIMIT_MSGQUEUE" => Resource::RLIMIT_MSGQUEUE,
        "RLIMIT_NICE" => Resource::RLIMIT_NICE,
        "RLIMIT_NOFILE" => Resource::RLIMIT_NOFILE,
        "RLIMIT_NPROC" => Resource::RLIMIT_NPROC,
        "RLIMIT_RSS" => Resource::RLIMIT_RSS,
        "RLIMIT_RTPRIO" => Resource::RLIMIT_RTPRIO,
        "RLIMIT_RTTIME" => Resource::RLIMIT_RTTIME,
        "RLIMIT_SIGPENDING" => Resource::RLIMIT_SIGPENDING,
        "RLIMIT_STACK" => Resource::RLIMIT_STACK,
        other => {
            return Err(CradleError::Config(format!(
                "unknown rlimit type {}",
                other
            )))
        }
    };
    Ok(resource)
}
