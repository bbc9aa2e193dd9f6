//! Control server.
//!
//! One JSON object per connection on the control socket. A message may
//! carry a console resize, a log-reopen request, both (resize first), or
//! neither. Decode and accept failures end the server task through the
//! fatal sink; the supervisor treats those as terminal.

use cradle_shared::control::{ConsoleSize, ControlMessage};
use cradle_shared::errors::{CradleError, CradleResult};
use crate::logger::Logger;
use nix::pty::Winsize;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::UnixListener;
use tokio::sync::mpsc::UnboundedSender;

/// Serve control requests until the listener fails or a message is
/// malformed.
pub async fn serve(
    listener: UnixListener,
    logger: Arc<Logger>,
    master: Option<Arc<OwnedFd>>,
    fatal: UnboundedSender<CradleError>,
) {
    loop {
        let (mut conn, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                let _ = fatal.send(CradleError::Setup(format!("control accept: {}", e)));
                return;
            }
        };

        let mut raw = Vec::new();
        if let Err(e) = conn.read_to_end(&mut raw).await {
            let _ = fatal.send(CradleError::Setup(format!("control read: {}", e)));
            return;
        }
        drop(conn);

        let message: ControlMessage = match serde_json::from_slice(&raw) {
            Ok(message) => message,
            Err(e) => {
                let _ = fatal.send(CradleError::Setup(format!(
                    "decoding control message: {}",
                    e
                )));
                return;
            }
        };

        // Defined order: resize before reopen. Resize without a pty is
        // silently ignored.
        if let (Some(size), Some(master)) = (message.console_size, master.as_ref()) {
            if let Err(e) = resize_pty(master.as_raw_fd(), size) {
                let _ = fatal.send(e);
                return;
            }
            tracing::debug!(width = size.width, height = size.height, "applied console resize");
        }

        if message.reopen_log {
            if let Err(e) = logger.reopen() {
                let _ = fatal.send(e);
                return;
            }
            tracing::debug!(path = %logger.path().display(), "reopened container log");
        }
    }
}

/// Apply a window size to the pty master.
pub fn resize_pty(master: RawFd, size: ConsoleSize) -> CradleResult<()> {
    let winsize = Winsize {
        ws_row: size.height,
        ws_col: size.width,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: the master fd is held open by the supervisor for the lifetime
    // of this task; TIOCSWINSZ reads the winsize struct and nothing else.
    let rc = unsafe { libc::ioctl(master, libc::TIOCSWINSZ, &winsize) };
    if rc < 0 {
        return Err(CradleError::Setup(format!(
            "applying console size: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streams::StreamPair;

    #[test]
    fn test_resize_round_trips_through_kernel() {
        let pair = StreamPair::terminal().unwrap();
        let host = pair.into_host();
        let master = host.master().unwrap();

        resize_pty(
            master.as_raw_fd(),
            ConsoleSize {
                width: 132,
                height: 40,
            },
        )
        .unwrap();

        let mut winsize = Winsize {
            ws_row: 0,
            ws_col: 0,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        // SAFETY: same fd, TIOCGWINSZ fills the struct.
        let rc = unsafe { libc::ioctl(master.as_raw_fd(), libc::TIOCGWINSZ, &mut winsize) };
        assert_eq!(rc, 0);
        assert_eq!(winsize.ws_col, 132);
        assert_eq!(winsize.ws_row, 40);
    }

    #[test]
    fn test_resize_on_closed_fd_fails() {
        let err = resize_pty(
            -1,
            ConsoleSize {
                width: 80,
                height: 24,
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("applying console size"));
    }
}
