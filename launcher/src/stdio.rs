//! Stdio installation for the payload.
//!
//! Exactly one branch runs before exec: terminal mode puts the pty slave on
//! fds 0/1/2 and makes it the controlling terminal; pipe mode puts the pipe
//! write ends on fds 1/2 and closes stdin.

use cradle_shared::errors::{CradleError, CradleResult};
use nix::unistd::{close, dup2, setsid};
use std::os::unix::io::RawFd;

/// Install the pty slave as stdin/stdout/stderr and take the terminal.
///
/// Both original pty fds are closed afterwards; the payload only ever sees
/// fds 0/1/2. The launcher becomes a session leader so `TIOCSCTTY` may
/// claim the slave as controlling terminal.
pub fn install_terminal(master_fd: RawFd, slave_fd: RawFd) -> CradleResult<()> {
    for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        dup2(slave_fd, target)
            .map_err(|e| CradleError::Launch(format!("duplicating pty slave onto fd {}: {}", target, e)))?;
    }
    close(master_fd)
        .map_err(|e| CradleError::Launch(format!("closing pty master: {}", e)))?;
    close(slave_fd)
        .map_err(|e| CradleError::Launch(format!("closing pty slave: {}", e)))?;

    setsid().map_err(|e| CradleError::Launch(format!("setsid: {}", e)))?;

    // SAFETY: fd 0 is the pty slave installed above and stays open through
    // exec; TIOCSCTTY takes an int argument, not a pointer.
    let rc = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY, 1) };
    if rc < 0 {
        return Err(CradleError::Launch(format!(
            "failed to set controlling terminal: {}",
            std::io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Install the pipe write ends as stdout/stderr and close stdin.
///
/// All four pipe fds are closed in this process; the supervisor keeps its
/// own copies of the read ends.
pub fn install_pipes(
    output_read: RawFd,
    output_write: RawFd,
    error_read: RawFd,
    error_write: RawFd,
) -> CradleResult<()> {
    dup2(output_write, libc::STDOUT_FILENO)
        .map_err(|e| CradleError::Launch(format!("duplicating output pipe onto stdout: {}", e)))?;
    close(output_write)
        .map_err(|e| CradleError::Launch(format!("closing output pipe write end: {}", e)))?;
    close(output_read)
        .map_err(|e| CradleError::Launch(format!("closing output pipe read end: {}", e)))?;

    dup2(error_write, libc::STDERR_FILENO)
        .map_err(|e| CradleError::Launch(format!("duplicating error pipe onto stderr: {}", e)))?;
    close(error_write)
        .map_err(|e| CradleError::Launch(format!("closing error pipe write end: {}", e)))?;
    close(error_read)
        .map_err(|e| CradleError::Launch(format!("closing error pipe read end: {}", e)))?;

    close(libc::STDIN_FILENO)
        .map_err(|e| CradleError::Launch(format!("closing stdin: {}", e)))?;

    Ok(())
}
