//! Supervisor end of the launcher handshake.
//!
//! The protocol alternates strictly: the launcher pauses (`t`), the
//! supervisor finishes setup and releases it (`s`), then one final read
//! resolves the start. EOF is the normal outcome - exec replaced the
//! launcher's process image and its channel end died with it. A stray `t`
//! instead of EOF is the launcher's exec-failure advisory.

use cradle_shared::errors::{CradleError, CradleResult};
use cradle_shared::handshake::{PAUSED, PROCEED};
use std::os::unix::net::UnixStream as StdUnixStream;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

/// How the launcher start resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The payload exec'd; run poststart.
    Started,

    /// The launcher reported an exec failure; skip poststart.
    ExecFailed,
}

/// The supervisor's async end of the handshake channel.
pub struct SupervisorHandshake {
    stream: UnixStream,
}

impl SupervisorHandshake {
    /// Adopt the supervisor's end of the socketpair.
    pub fn new(stream: StdUnixStream) -> CradleResult<Self> {
        stream
            .set_nonblocking(true)
            .map_err(|e| CradleError::Setup(format!("handshake channel: {}", e)))?;
        let stream = UnixStream::from_std(stream)
            .map_err(|e| CradleError::Setup(format!("handshake channel: {}", e)))?;
        Ok(Self { stream })
    }

    /// Wait for the launcher's pause byte.
    pub async fn await_paused(&mut self) -> CradleResult<()> {
        let mut byte = [0u8; 1];
        let n = self
            .stream
            .read(&mut byte)
            .await
            .map_err(|e| CradleError::Setup(format!("reading handshake: {}", e)))?;
        if n == 0 {
            return Err(CradleError::Launch(
                "launcher exited before pausing".into(),
            ));
        }
        if byte[0] != PAUSED {
            return Err(CradleError::Launch(format!(
                "unexpected handshake byte {:#04x}",
                byte[0]
            )));
        }
        Ok(())
    }

    /// Release the paused launcher.
    pub async fn send_proceed(&mut self) -> CradleResult<()> {
        self.stream
            .write_all(&[PROCEED])
            .await
            .map_err(|e| CradleError::Setup(format!("failed to send start ack: {}", e)))
    }

    /// Resolve the start: EOF means the payload exec'd, a byte means the
    /// launcher is telling us exec failed.
    pub async fn await_exec(&mut self) -> CradleResult<StartOutcome> {
        let mut byte = [0u8; 1];
        let n = self
            .stream
            .read(&mut byte)
            .await
            .map_err(|e| CradleError::Setup(format!("reading handshake: {}", e)))?;
        if n == 0 {
            Ok(StartOutcome::Started)
        } else {
            Ok(StartOutcome::ExecFailed)
        }
    }
}
