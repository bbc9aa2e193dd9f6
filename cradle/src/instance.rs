//! Per-container instance directory.
//!
//! The instance directory hosts everything the supervisor publishes for a
//! container: the state document, the attach and control sockets, the
//! default log file. Socket files are removed at teardown.

use cradle_shared::constants::files;
use cradle_shared::errors::{CradleError, CradleResult};
use cradle_shared::state::ContainerState;
use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// A container's instance directory.
#[derive(Debug, Clone)]
pub struct InstanceDir {
    root: PathBuf,
    id: String,
}

impl InstanceDir {
    /// Create (or reuse) the instance directory for a container id.
    pub fn create(base: &Path, id: &str) -> CradleResult<Self> {
        let root = base.join(id);
        fs::create_dir_all(&root).map_err(|e| {
            CradleError::Setup(format!(
                "creating instance directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self {
            root,
            id: id.to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn state_path(&self) -> PathBuf {
        self.root.join(files::STATE)
    }

    pub fn attach_socket_path(&self) -> PathBuf {
        self.root.join(files::ATTACH_SOCKET)
    }

    pub fn control_socket_path(&self) -> PathBuf {
        self.root.join(files::CONTROL_SOCKET)
    }

    /// Default log path, used when the caller configures none.
    pub fn default_log_path(&self) -> PathBuf {
        self.root.join(format!("{}{}", self.id, files::LOG_SUFFIX))
    }

    /// Persist the state document. Written to a temporary file first and
    /// renamed into place so watchers never see a torn document.
    pub fn write_state(&self, state: &ContainerState) -> CradleResult<()> {
        let raw = serde_json::to_vec(state)
            .map_err(|e| CradleError::Setup(format!("encoding state document: {}", e)))?;
        let tmp = self.root.join(format!("{}.tmp", files::STATE));
        fs::write(&tmp, raw)
            .map_err(|e| CradleError::Setup(format!("writing state document: {}", e)))?;
        fs::rename(&tmp, self.state_path())
            .map_err(|e| CradleError::Setup(format!("publishing state document: {}", e)))?;
        Ok(())
    }

    /// Read the state document back.
    pub fn read_state(&self) -> CradleResult<ContainerState> {
        let raw = fs::read(self.state_path())
            .map_err(|e| CradleError::Setup(format!("reading state document: {}", e)))?;
        serde_json::from_slice(&raw)
            .map_err(|e| CradleError::Setup(format!("decoding state document: {}", e)))
    }

    /// Remove the socket files, best effort. Called at teardown and when
    /// start-up aborts after socket creation.
    pub fn remove_sockets(&self) {
        for path in [self.attach_socket_path(), self.control_socket_path()] {
            if let Err(e) = fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove socket file");
                }
            }
        }
    }
}

/// Write a pid file: the decimal pid, no trailing newline, mode 0644.
pub fn write_pid_file(path: &Path, pid: i32) -> CradleResult<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o644)
        .open(path)
        .map_err(|e| CradleError::Setup(format!("opening pid file {}: {}", path.display(), e)))?;
    file.write_all(pid.to_string().as_bytes())
        .map_err(|e| CradleError::Setup(format!("writing pid file {}: {}", path.display(), e)))
}
