//! Stream endpoint allocation and ownership.
//!
//! Endpoints are created before the launcher is forked, so both processes
//! see the same fd numbers. After the fork the pair splits: the child-side
//! ends belong to the launcher until exec, the supervisor keeps the pty
//! master (or the pipe read ends) for the container's lifetime.

use cradle_shared::errors::{CradleError, CradleResult};
use cradle_shared::process::Stdio;
use nix::pty::{openpty, Winsize};
use nix::sys::termios::Termios;
use nix::unistd::pipe;
use std::os::unix::io::{AsRawFd, OwnedFd};
use std::sync::Arc;

/// A freshly allocated endpoint pair, before the fork splits ownership.
pub enum StreamPair {
    Terminal {
        master: OwnedFd,
        slave: OwnedFd,
    },
    Pipes {
        /// (read, write)
        output: (OwnedFd, OwnedFd),
        /// (read, write)
        error: (OwnedFd, OwnedFd),
    },
}

impl StreamPair {
    /// Allocate a pty pair for terminal mode.
    pub fn terminal() -> CradleResult<Self> {
        let pty = openpty(None::<&Winsize>, None::<&Termios>)
            .map_err(|e| CradleError::Setup(format!("allocating pty pair: {}", e)))?;
        Ok(Self::Terminal {
            master: pty.master,
            slave: pty.slave,
        })
    }

    /// Allocate the output and error pipes for pipe mode.
    pub fn pipes() -> CradleResult<Self> {
        let output =
            pipe().map_err(|e| CradleError::Setup(format!("allocating output pipe: {}", e)))?;
        let error =
            pipe().map_err(|e| CradleError::Setup(format!("allocating error pipe: {}", e)))?;
        Ok(Self::Pipes { output, error })
    }

    /// The fd-number description the launcher config carries.
    pub fn launcher_stdio(&self) -> Stdio {
        match self {
            Self::Terminal { master, slave } => Stdio::Terminal {
                master_fd: master.as_raw_fd(),
                slave_fd: slave.as_raw_fd(),
            },
            Self::Pipes { output, error } => Stdio::Pipes {
                output_read: output.0.as_raw_fd(),
                output_write: output.1.as_raw_fd(),
                error_read: error.0.as_raw_fd(),
                error_write: error.1.as_raw_fd(),
            },
        }
    }

    /// Split into the supervisor-side and child-side views. Call after the
    /// fork; dropping [`ChildStreams`] closes the launcher's ends in this
    /// process.
    pub fn split(self) -> (HostStreams, ChildStreams) {
        match self {
            Self::Terminal { master, slave } => (
                HostStreams::Terminal {
                    master: Arc::new(master),
                },
                ChildStreams::Terminal { slave },
            ),
            Self::Pipes { output, error } => (
                HostStreams::Pipes {
                    output: output.0,
                    error: error.0,
                },
                ChildStreams::Pipes {
                    output_write: output.1,
                    error_write: error.1,
                },
            ),
        }
    }

    /// Supervisor-side view, discarding the child ends.
    pub fn into_host(self) -> HostStreams {
        self.split().0
    }
}

/// The supervisor's view of the stream endpoints.
///
/// The pty master is shared: the stream pump and the control server each
/// clone the [`Arc`], and the fd closes exactly once when the last clone
/// drops at supervisor shutdown.
pub enum HostStreams {
    Terminal { master: Arc<OwnedFd> },
    Pipes { output: OwnedFd, error: OwnedFd },
}

impl HostStreams {
    /// The pty master, when running in terminal mode.
    pub fn master(&self) -> Option<Arc<OwnedFd>> {
        match self {
            Self::Terminal { master } => Some(Arc::clone(master)),
            Self::Pipes { .. } => None,
        }
    }
}

/// The launcher's ends, kept alive in the supervisor only until the fork
/// has happened.
pub enum ChildStreams {
    Terminal { slave: OwnedFd },
    Pipes {
        output_write: OwnedFd,
        error_write: OwnedFd,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipes_fd_description() {
        let pair = StreamPair::pipes().unwrap();
        match pair.launcher_stdio() {
            Stdio::Pipes {
                output_read,
                output_write,
                error_read,
                error_write,
            } => {
                for fd in [output_read, output_write, error_read, error_write] {
                    assert!(fd >= 0);
                }
            }
            other => panic!("unexpected stdio: {:?}", other),
        }
    }

    #[test]
    fn test_terminal_master_shared() {
        let pair = StreamPair::terminal().unwrap();
        let host = pair.into_host();
        let first = host.master().unwrap();
        let second = host.master().unwrap();
        assert_eq!(first.as_raw_fd(), second.as_raw_fd());
    }

    #[test]
    fn test_pipe_mode_has_no_master() {
        let host = StreamPair::pipes().unwrap().into_host();
        assert!(host.master().is_none());
    }
}
