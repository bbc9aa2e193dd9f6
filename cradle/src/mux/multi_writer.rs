//! Fan-out writer for payload output.
//!
//! One `MultiWriter` per payload stream. Fixed members (the container log,
//! the supervisor's own stdout/stderr in pipe mode, the scrollback buffer
//! in terminal mode) are written synchronously under the members mutex.
//! Attach clients are backed by bounded queues drained by their own writer
//! tasks; a congested client loses chunks, nobody else stalls, and the log
//! is never dropped.
//!
//! Attachment happens under the same mutex as writes, which is what makes
//! the scrollback replay atomic: no pump byte can land on the client queue
//! between the snapshot seed and the membership insert.

use super::terminal_buffer::TerminalBuffer;
use crate::logger::LogWriter;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Tee of a pipe-mode payload stream onto the supervisor's own stdio.
#[derive(Debug, Clone, Copy)]
pub enum Passthrough {
    Stdout,
    Stderr,
}

impl Passthrough {
    fn write(&self, buf: &[u8]) {
        match self {
            Passthrough::Stdout => {
                let mut out = std::io::stdout();
                let _ = out.write_all(buf);
                let _ = out.flush();
            }
            Passthrough::Stderr => {
                let mut err = std::io::stderr();
                let _ = err.write_all(buf);
                let _ = err.flush();
            }
        }
    }
}

enum Sink {
    Log(LogWriter),
    Passthrough(Passthrough),
    Scrollback(Arc<TerminalBuffer>),
    Client {
        id: u64,
        queue: mpsc::Sender<Vec<u8>>,
    },
}

struct Inner {
    sinks: Vec<Sink>,
    next_client: u64,
    closed: bool,
}

/// Fan-out writer with dynamic membership.
pub struct MultiWriter {
    inner: Mutex<Inner>,
}

impl MultiWriter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                sinks: Vec::new(),
                next_client: 0,
                closed: false,
            }),
        }
    }

    pub fn add_log(&self, writer: LogWriter) {
        self.inner.lock().unwrap().sinks.push(Sink::Log(writer));
    }

    pub fn add_passthrough(&self, passthrough: Passthrough) {
        self.inner
            .lock()
            .unwrap()
            .sinks
            .push(Sink::Passthrough(passthrough));
    }

    pub fn add_scrollback(&self, buffer: Arc<TerminalBuffer>) {
        self.inner
            .lock()
            .unwrap()
            .sinks
            .push(Sink::Scrollback(buffer));
    }

    /// Deliver a chunk to every member. No-op once closed.
    pub fn write(&self, buf: &[u8]) {
        let inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        for sink in &inner.sinks {
            match sink {
                Sink::Log(writer) => writer.write(buf),
                Sink::Passthrough(passthrough) => passthrough.write(buf),
                Sink::Scrollback(buffer) => buffer.push(buf),
                Sink::Client { id, queue } => {
                    if let Err(mpsc::error::TrySendError::Full(_)) = queue.try_send(buf.to_vec()) {
                        tracing::trace!(client = id, "attach client congested, dropping chunk");
                    }
                }
            }
        }
    }

    /// Mark the stream finished. Later writes are no-ops; a pending partial
    /// log line is flushed. Attachment stays possible (late attachers still
    /// get the scrollback snapshot).
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return;
        }
        inner.closed = true;
        for sink in &inner.sinks {
            if let Sink::Log(writer) = sink {
                writer.flush_partial();
            }
        }
    }

    /// Add an attach client queue. With `replay_scrollback` the scrollback
    /// snapshot is seeded onto the queue first, atomically with the insert.
    pub fn attach(&self, queue: mpsc::Sender<Vec<u8>>, replay_scrollback: bool) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_client;
        inner.next_client += 1;

        if replay_scrollback {
            for sink in &inner.sinks {
                if let Sink::Scrollback(buffer) = sink {
                    let snapshot = buffer.snapshot();
                    if !snapshot.is_empty() {
                        let _ = queue.try_send(snapshot);
                    }
                    break;
                }
            }
        }

        inner.sinks.push(Sink::Client { id, queue });
        id
    }

    /// Remove a client. Unknown ids are ignored, so removal is idempotent.
    pub fn detach(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .sinks
            .retain(|sink| !matches!(sink, Sink::Client { id: member, .. } if *member == id));
    }
}

impl Default for MultiWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::{LogFormat, Logger};

    fn log_fixture() -> (tempfile::TempDir, Arc<Logger>) {
        let dir = tempfile::tempdir().unwrap();
        let logger = Logger::open(dir.path().join("c1.log"), LogFormat::Kubernetes).unwrap();
        (dir, logger)
    }

    #[test]
    fn test_congested_client_never_starves_log() {
        let (dir, logger) = log_fixture();
        let writer = MultiWriter::new();
        writer.add_log(logger.writer("stdout"));

        let (tx, mut rx) = mpsc::channel(1);
        writer.attach(tx, false);

        for _ in 0..10 {
            writer.write(b"line\n");
        }

        // The client queue held one chunk and dropped the rest.
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());

        let log = std::fs::read_to_string(dir.path().join("c1.log")).unwrap();
        assert_eq!(log.lines().count(), 10);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let writer = MultiWriter::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = writer.attach(tx, false);

        writer.detach(id);
        writer.detach(id);
        writer.detach(999);

        writer.write(b"still fine\n");
    }

    #[test]
    fn test_writes_after_close_are_noops() {
        let writer = MultiWriter::new();
        let (tx, mut rx) = mpsc::channel(4);
        writer.attach(tx, false);

        writer.write(b"before\n");
        writer.close();
        writer.write(b"after\n");

        assert_eq!(rx.try_recv().unwrap(), b"before\n");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_flushes_partial_log_line() {
        let (dir, logger) = log_fixture();
        let writer = MultiWriter::new();
        writer.add_log(logger.writer("stdout"));

        writer.write(b"cut off");
        writer.close();

        let log = std::fs::read_to_string(dir.path().join("c1.log")).unwrap();
        assert!(log.contains(" stdout P cut off"));
    }

    #[test]
    fn test_attach_after_close_still_replays_snapshot() {
        let writer = MultiWriter::new();
        let buffer = Arc::new(TerminalBuffer::new());
        writer.add_scrollback(Arc::clone(&buffer));

        writer.write(b"$ uptime\n");
        writer.close();

        let (tx, mut rx) = mpsc::channel(4);
        writer.attach(tx, true);
        assert_eq!(rx.try_recv().unwrap(), b"$ uptime\n");
    }

    #[test]
    fn test_snapshot_replay_precedes_new_bytes() {
        let writer = MultiWriter::new();
        let buffer = Arc::new(TerminalBuffer::new());
        writer.add_scrollback(Arc::clone(&buffer));

        writer.write(b"old\n");

        let (tx, mut rx) = mpsc::channel(4);
        writer.attach(tx, true);
        writer.write(b"new\n");

        assert_eq!(rx.try_recv().unwrap(), b"old\n");
        assert_eq!(rx.try_recv().unwrap(), b"new\n");
        assert!(rx.try_recv().is_err());
    }
}
