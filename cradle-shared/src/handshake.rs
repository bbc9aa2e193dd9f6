//! Handshake protocol between launcher and supervisor.
//!
//! The channel is a connected socketpair inherited by the launcher at fork.
//! Exactly one byte travels in each direction during setup:
//!
//! ```text
//! launcher   --- PAUSED ('t') -->   supervisor     "I'm paused, do your setup"
//! launcher   <-- PROCEED ('s') ---  supervisor     "setup done, exec now"
//! ```
//!
//! EOF on the supervisor side afterwards means the launcher exec'd (its end
//! of the channel died with the process image) or the launcher itself died.
//! A second `PAUSED` byte instead of EOF is the advisory "exec failed, skip
//! poststart" signal; it may be lost if exec already closed the channel.

use std::io::{self, Read, Write};
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::net::UnixStream;

/// Launcher → supervisor: paused and waiting; also the exec-failure advisory.
pub const PAUSED: u8 = b't';

/// Supervisor → launcher: setup complete, proceed to exec.
pub const PROCEED: u8 = b's';

/// The launcher's synchronous end of the handshake channel.
pub struct LauncherHandshake {
    stream: UnixStream,
}

impl LauncherHandshake {
    /// Wrap an inherited socketpair fd.
    ///
    /// The fd necessarily arrived with close-on-exec cleared (it had to
    /// survive into this process), so it gets re-armed here: a successful
    /// exec must close this end, or the supervisor would never read the
    /// EOF that means "payload started".
    ///
    /// # Safety
    ///
    /// `fd` must be an open stream-socket fd owned by the caller and not
    /// used elsewhere after this call.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
        Self {
            stream: UnixStream::from_raw_fd(fd),
        }
    }

    /// Tell the supervisor the launcher is paused and ready for setup.
    pub fn signal_paused(&mut self) -> io::Result<()> {
        self.stream.write_all(&[PAUSED])
    }

    /// Block until the supervisor releases the launcher.
    ///
    /// EOF here means the supervisor aborted start-up and never sent
    /// [`PROCEED`]; the launcher should exit.
    pub fn await_proceed(&mut self) -> io::Result<()> {
        let mut byte = [0u8; 1];
        let n = self.stream.read(&mut byte)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "supervisor closed the handshake channel before releasing",
            ));
        }
        Ok(())
    }

    /// Best-effort advisory that exec failed; the supervisor skips poststart
    /// if the byte arrives before EOF.
    pub fn signal_exec_failed(&mut self) {
        let _ = self.stream.write_all(&[PAUSED]);
    }

    /// Shut the channel down so the supervisor sees EOF (empty-process
    /// branch, which never execs and so never closes it implicitly).
    pub fn shutdown(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

impl From<UnixStream> for LauncherHandshake {
    fn from(stream: UnixStream) -> Self {
        Self { stream }
    }
}
