//! Stream multiplexer.
//!
//! Delivers payload stdout/stderr to the container log and every attached
//! client, keeps terminal scrollback for late attachers, and routes client
//! input to the pty master when one exists. Two long-lived pump tasks copy
//! payload output into the fan-out writers; their EOF marks payload
//! completion.

mod multi_writer;
mod terminal_buffer;

pub use multi_writer::{MultiWriter, Passthrough};
pub use terminal_buffer::TerminalBuffer;

use crate::logger::Logger;
use crate::streams::HostStreams;
use cradle_shared::errors::{CradleError, CradleResult};
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{unix::OwnedReadHalf, UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::sync::mpsc::UnboundedSender;

/// Chunks a slow attach client may have in flight before it starts losing
/// output.
const CLIENT_QUEUE_CHUNKS: usize = 64;

/// The multiplexer for one container's streams.
pub struct StreamMux {
    output: Arc<MultiWriter>,
    error: Option<Arc<MultiWriter>>,
    streams: HostStreams,
}

impl StreamMux {
    /// Wire up the fan-out writers for the given endpoints.
    ///
    /// Terminal mode: stdout writer carries the log writer and the
    /// scrollback buffer. Pipe mode: stdout and stderr writers each carry
    /// their log writer plus a tee onto the supervisor's own stdio.
    pub fn new(streams: HostStreams, logger: &Arc<Logger>) -> Self {
        let output = Arc::new(MultiWriter::new());
        output.add_log(logger.writer("stdout"));

        let mut error = None;
        match &streams {
            HostStreams::Terminal { .. } => {
                output.add_scrollback(Arc::new(TerminalBuffer::new()));
            }
            HostStreams::Pipes { .. } => {
                output.add_passthrough(Passthrough::Stdout);

                let stderr_writer = Arc::new(MultiWriter::new());
                stderr_writer.add_log(logger.writer("stderr"));
                stderr_writer.add_passthrough(Passthrough::Stderr);
                error = Some(stderr_writer);
            }
        }

        Self {
            output,
            error,
            streams,
        }
    }

    /// Run the pumps and the attach accept loop. Returns when the listener
    /// fails; the failure is reported on the fatal sink.
    pub async fn run(self, listener: UnixListener, fatal: UnboundedSender<CradleError>) {
        let (stdout_source, stderr_source, master) = match self.streams {
            HostStreams::Terminal { master } => {
                let source = match dup_to_file(&master) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = fatal.send(e);
                        return;
                    }
                };
                (source, None, Some(master))
            }
            HostStreams::Pipes { output, error } => {
                (fd_to_file(output), Some(fd_to_file(error)), None)
            }
        };

        tokio::spawn(pump(stdout_source, Arc::clone(&self.output)));
        if let (Some(source), Some(writer)) = (stderr_source, self.error.clone()) {
            tokio::spawn(pump(source, writer));
        }

        loop {
            let (conn, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    let _ = fatal.send(CradleError::Setup(format!("attach accept: {}", e)));
                    return;
                }
            };

            tokio::spawn(handle_attach(
                conn,
                Arc::clone(&self.output),
                self.error.clone(),
                master.clone(),
            ));
        }
    }
}

/// Copy payload output into a fan-out writer until EOF.
///
/// A pty master read also errors (EIO) once the slave side is fully closed;
/// either way the stream is finished and the writer closes.
async fn pump(mut source: tokio::fs::File, writer: Arc<MultiWriter>) {
    let mut buf = [0u8; 8192];
    loop {
        match source.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => writer.write(&buf[..n]),
        }
    }
    writer.close();
}

/// One attach client: join the fan-out, replay scrollback, route input,
/// leave on disconnect.
async fn handle_attach(
    conn: UnixStream,
    output: Arc<MultiWriter>,
    error: Option<Arc<MultiWriter>>,
    master: Option<Arc<OwnedFd>>,
) {
    let (reader, mut write_half) = conn.into_split();

    let (queue, mut chunks) = mpsc::channel::<Vec<u8>>(CLIENT_QUEUE_CHUNKS);
    let output_id = output.attach(queue.clone(), true);
    let error_id = error.as_ref().map(|writer| writer.attach(queue.clone(), false));
    drop(queue);

    let writer_task = tokio::spawn(async move {
        use tokio::io::AsyncWriteExt;
        while let Some(chunk) = chunks.recv().await {
            if write_half.write_all(&chunk).await.is_err() {
                break;
            }
        }
    });

    copy_client_input(reader, master.as_ref()).await;

    output.detach(output_id);
    if let (Some(writer), Some(id)) = (error.as_ref(), error_id) {
        writer.detach(id);
    }
    let _ = writer_task.await;
}

/// Terminal mode feeds client bytes to the pty master; pipe mode discards
/// them. Either way this returns once the client disconnects.
async fn copy_client_input(mut reader: OwnedReadHalf, master: Option<&Arc<OwnedFd>>) {
    match master {
        Some(master) => match dup_to_file(master) {
            Ok(mut pty) => {
                let _ = tokio::io::copy(&mut reader, &mut pty).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to clone pty master for attach input");
                let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
            }
        },
        None => {
            let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
        }
    }
}

fn fd_to_file(fd: OwnedFd) -> tokio::fs::File {
    tokio::fs::File::from_std(std::fs::File::from(fd))
}

fn dup_to_file(fd: &Arc<OwnedFd>) -> CradleResult<tokio::fs::File> {
    let duplicate = nix::unistd::dup(fd.as_raw_fd())
        .map_err(|e| CradleError::Setup(format!("duplicating pty master: {}", e)))?;
    // SAFETY: dup just handed us this fd and nothing else owns it.
    let file = unsafe { std::fs::File::from_raw_fd(duplicate) };
    Ok(tokio::fs::File::from_std(file))
}
