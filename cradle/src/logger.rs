//! Container output log.
//!
//! Every payload line becomes one log record carrying a timestamp, a stream
//! tag and the payload bytes, rendered by one of a closed set of formats.
//! The logger owns its file and serializes writes internally; `reopen`
//! swaps the underlying file atomically with respect to writes, which is
//! what makes external log rotation safe.

use chrono::{SecondsFormat, Utc};
use cradle_shared::errors::{CradleError, CradleResult};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Known log record formats. The set is closed; unknown names are a
/// start-up error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// CRI-style: `<timestamp> <stream> <F|P> <text>`.
    Kubernetes,

    /// Docker-style: one JSON object per line with `time`, `stream`, `log`.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = CradleError;

    fn from_str(s: &str) -> CradleResult<Self> {
        match s {
            "kubernetes" => Ok(LogFormat::Kubernetes),
            "json" => Ok(LogFormat::Json),
            other => Err(CradleError::Config(format!(
                "log format {} is not supported",
                other
            ))),
        }
    }
}

impl LogFormat {
    fn render(&self, stream: &str, line: &[u8], partial: bool) -> Vec<u8> {
        let time = Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true);
        match self {
            LogFormat::Kubernetes => {
                let tag = if partial { "P" } else { "F" };
                let mut record = format!("{} {} {} ", time, stream, tag).into_bytes();
                record.extend_from_slice(line);
                record.push(b'\n');
                record
            }
            LogFormat::Json => {
                let mut text = String::from_utf8_lossy(line).into_owned();
                if !partial {
                    text.push('\n');
                }
                let mut record = serde_json::json!({
                    "time": time,
                    "stream": stream,
                    "log": text,
                })
                .to_string()
                .into_bytes();
                record.push(b'\n');
                record
            }
        }
    }
}

/// The container log file.
pub struct Logger {
    path: PathBuf,
    format: LogFormat,
    file: Mutex<File>,
}

impl Logger {
    /// Open (append-create) the log file.
    pub fn open(path: impl Into<PathBuf>, format: LogFormat) -> CradleResult<Arc<Self>> {
        let path = path.into();
        let file = Self::open_file(&path)?;
        Ok(Arc::new(Self {
            path,
            format,
            file: Mutex::new(file),
        }))
    }

    fn open_file(path: &Path) -> CradleResult<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CradleError::Setup(format!("opening log {}: {}", path.display(), e)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reopen the underlying file at the original path. Previously written
    /// bytes stay wherever rotation moved them; new records go to the fresh
    /// file.
    pub fn reopen(&self) -> CradleResult<()> {
        let fresh = Self::open_file(&self.path)?;
        *self.file.lock().unwrap() = fresh;
        Ok(())
    }

    /// A per-stream writer handle for the multiplexer.
    pub fn writer(self: &Arc<Self>, stream: &'static str) -> LogWriter {
        LogWriter {
            logger: Arc::clone(self),
            stream,
            pending: Mutex::new(Vec::new()),
        }
    }

    fn append(&self, record: &[u8]) {
        let mut file = self.file.lock().unwrap();
        if let Err(e) = file.write_all(record) {
            tracing::warn!(path = %self.path.display(), error = %e, "container log write failed");
        }
    }
}

/// Stream-tagged writer that cuts the byte stream into line records.
///
/// Bytes after the last newline are held back until the line completes;
/// whatever is still pending when the writer drops is flushed as a partial
/// record.
pub struct LogWriter {
    logger: Arc<Logger>,
    stream: &'static str,
    pending: Mutex<Vec<u8>>,
}

impl LogWriter {
    pub fn write(&self, buf: &[u8]) {
        let mut pending = self.pending.lock().unwrap();
        pending.extend_from_slice(buf);
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            let record = self
                .logger
                .format
                .render(self.stream, &line[..line.len() - 1], false);
            self.logger.append(&record);
        }
    }

    pub fn flush_partial(&self) {
        let mut pending = self.pending.lock().unwrap();
        if !pending.is_empty() {
            let record = self.logger.format.render(self.stream, &pending, true);
            self.logger.append(&record);
            pending.clear();
        }
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.flush_partial();
    }
}
