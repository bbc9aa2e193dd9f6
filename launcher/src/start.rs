//! The launcher run sequence.
//!
//! Ordering matters: configuration errors surface before any fd is touched,
//! the pause byte is only sent once stdio is installed, and security
//! configuration happens last so exec follows it immediately.

use crate::rlimit::apply_rlimits;
use crate::security::SecurityConfigurator;
use crate::stdio;
use cradle_shared::errors::{CradleError, CradleResult};
use cradle_shared::handshake::LauncherHandshake;
use cradle_shared::process::{LauncherConfig, Stdio};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{chdir, execve, Pid};
use std::convert::Infallible;
use std::ffi::CString;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Finalize the container environment and replace this process with the
/// payload. Returns only on error; on success the process image is gone.
pub fn run(
    handshake: &mut LauncherHandshake,
    config: &LauncherConfig,
    security: &dyn SecurityConfigurator,
) -> CradleResult<Infallible> {
    let process = &config.process;

    let cwd = effective_cwd(&process.cwd)?;
    chdir(Path::new(cwd))
        .map_err(|e| CradleError::Launch(format!("can't enter working directory {}: {}", cwd, e)))?;

    apply_rlimits(&process.rlimits)?;

    if config.empty_process {
        return empty_process(handshake, config, security);
    }

    if process.args.is_empty() {
        return Err(CradleError::Config("args must not be empty".into()));
    }

    let path_env = first_path_entry(&process.env);
    let resolved = lookup_program(&process.args[0], path_env)?;

    match config.stdio {
        Some(Stdio::Terminal {
            master_fd,
            slave_fd,
        }) => stdio::install_terminal(master_fd, slave_fd)?,
        Some(Stdio::Pipes {
            output_read,
            output_write,
            error_read,
            error_write,
        }) => stdio::install_pipes(output_read, output_write, error_read, error_write)?,
        None => {}
    }

    if !config.pure_exec {
        handshake
            .signal_paused()
            .map_err(|e| CradleError::Launch(format!("failed to signal pause: {}", e)))?;
        handshake
            .await_proceed()
            .map_err(|e| CradleError::Launch(format!("failed to receive start ack: {}", e)))?;
    }

    security.configure(process)?;

    let path_c = cstring(resolved.as_os_str().as_encoded_bytes())?;
    let mut argv: Vec<CString> = Vec::with_capacity(process.args.len());
    argv.push(path_c.clone());
    for arg in &process.args[1..] {
        argv.push(cstring(arg.as_bytes())?);
    }
    let envp: Vec<CString> = process
        .env
        .iter()
        .map(|e| cstring(e.as_bytes()))
        .collect::<CradleResult<_>>()?;

    // execve only returns on failure.
    let err = execve(&path_c, &argv, &envp).unwrap_err();

    if !config.pure_exec {
        // Advisory only; lost if exec's implicit close already won the race.
        handshake.signal_exec_failed();
    }

    Err(CradleError::Launch(format!(
        "exec {} failed: {}",
        resolved.display(),
        err
    )))
}

/// Pause-only containers: no payload, no exec. The launcher pauses for the
/// supervisor as usual, then sits in a signal loop reaping children until
/// told to exit.
fn empty_process(
    handshake: &mut LauncherHandshake,
    config: &LauncherConfig,
    security: &dyn SecurityConfigurator,
) -> CradleResult<Infallible> {
    handshake
        .signal_paused()
        .map_err(|e| CradleError::Launch(format!("failed to signal pause: {}", e)))?;
    handshake
        .await_proceed()
        .map_err(|e| CradleError::Launch(format!("failed to receive start ack: {}", e)))?;
    // No exec will ever close this end; do it explicitly.
    handshake.shutdown();

    let mut mask = SigSet::empty();
    mask.add(Signal::SIGCHLD);
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    mask.thread_block()
        .map_err(|e| CradleError::Launch(format!("blocking signals: {}", e)))?;

    security.configure(&config.process)?;

    loop {
        let signal = mask
            .wait()
            .map_err(|e| CradleError::Launch(format!("waiting for signals: {}", e)))?;
        match signal {
            Signal::SIGCHLD => reap_children(),
            Signal::SIGINT | Signal::SIGTERM => std::process::exit(0),
            _ => {}
        }
    }
}

/// Reap every exited child without blocking.
fn reap_children() {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(_) => continue,
        }
    }
}

/// Normalize and validate the working directory: empty means `/`, anything
/// else must be absolute.
pub(crate) fn effective_cwd(cwd: &str) -> CradleResult<&str> {
    if cwd.is_empty() {
        return Ok("/");
    }
    if !Path::new(cwd).is_absolute() {
        return Err(CradleError::Config(
            "cwd property must be an absolute path".into(),
        ));
    }
    Ok(cwd)
}

/// The value of the first `PATH=` entry in the environment, or empty.
pub(crate) fn first_path_entry(env: &[String]) -> &str {
    env.iter()
        .find_map(|e| e.strip_prefix("PATH="))
        .unwrap_or("")
}

/// Resolve a program name the way a shell would: names containing a slash
/// are used directly, bare names are searched in `path`. The result is
/// absolute (relative matches resolve against the working directory).
pub(crate) fn lookup_program(program: &str, path: &str) -> CradleResult<PathBuf> {
    if program.contains('/') {
        let candidate = PathBuf::from(program);
        if is_executable(&candidate) {
            return absolutize(candidate);
        }
        return Err(CradleError::Launch(format!(
            "{}: no such executable",
            program
        )));
    }

    for dir in path.split(':').filter(|dir| !dir.is_empty()) {
        let candidate = Path::new(dir).join(program);
        if is_executable(&candidate) {
            return absolutize(candidate);
        }
    }

    Err(CradleError::Launch(format!(
        "{}: executable file not found in PATH",
        program
    )))
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

fn absolutize(path: PathBuf) -> CradleResult<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| CradleError::Launch(format!("resolving working directory: {}", e)))?;
    Ok(cwd.join(path))
}

fn cstring(bytes: &[u8]) -> CradleResult<CString> {
    CString::new(bytes)
        .map_err(|_| CradleError::Config("argument contains an interior NUL byte".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::OpenOptionsExt;

    #[test]
    fn test_effective_cwd() {
        assert_eq!(effective_cwd("").unwrap(), "/");
        assert_eq!(effective_cwd("/srv/app").unwrap(), "/srv/app");
        let err = effective_cwd("relative/path").unwrap_err();
        assert_eq!(err.to_string(), "config: cwd property must be an absolute path");
    }

    #[test]
    fn test_first_path_entry_wins() {
        let env = vec![
            "HOME=/root".to_string(),
            "PATH=/first/bin".to_string(),
            "PATH=/second/bin".to_string(),
        ];
        assert_eq!(first_path_entry(&env), "/first/bin");
        assert_eq!(first_path_entry(&[]), "");
    }

    #[test]
    fn test_lookup_program_in_path() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("tool");
        fs::OpenOptions::new()
            .create(true)
            .write(true)
            .mode(0o755)
            .open(&tool)
            .unwrap();

        let path = format!("/nonexistent:{}", dir.path().display());
        let resolved = lookup_program("tool", &path).unwrap();
        assert_eq!(resolved, tool);
    }

    #[test]
    fn test_lookup_skips_non_executable() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tool"), b"").unwrap();

        let path = dir.path().display().to_string();
        let err = lookup_program("tool", &path).unwrap_err();
        assert!(err.to_string().contains("not found in PATH"));
    }

    #[test]
    fn test_lookup_with_slash_bypasses_path() {
        let resolved = lookup_program("/bin/sh", "").unwrap();
        assert_eq!(resolved, PathBuf::from("/bin/sh"));

        let err = lookup_program("/does/not/exist", "").unwrap_err();
        assert!(err.to_string().contains("no such executable"));
    }

    #[test]
    fn test_empty_args_rejected_before_fd_work() {
        let mut config = LauncherConfig {
            process: Default::default(),
            stdio: None,
            empty_process: false,
            pure_exec: true,
        };
        config.process.cwd = "/".into();

        let (ours, _theirs) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut handshake = LauncherHandshake::from(ours);
        let err = run(&mut handshake, &config, &crate::PermitAll).unwrap_err();
        assert_eq!(err.to_string(), "config: args must not be empty");
    }
}
