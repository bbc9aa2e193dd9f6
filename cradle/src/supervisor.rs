//! Supervisor-side lifecycle orchestration.
//!
//! `pre_start` runs while the launcher is paused on the handshake channel:
//! prestart hooks, socket creation, state annotations, logger and pid file,
//! the `created` publication, and only then the release byte. `post_start`
//! and `stop` advance the state machine around the payload's lifetime. Background tasks (control server, stream multiplexer) report
//! terminal failures on the fatal sink instead of unwinding anyone.

use crate::control;
use crate::handshake::{StartOutcome, SupervisorHandshake};
use crate::hooks::run_hooks;
use crate::instance::{write_pid_file, InstanceDir};
use crate::logger::{LogFormat, Logger};
use crate::mux::StreamMux;
use crate::streams::HostStreams;
use cradle_shared::constants::annotations;
use cradle_shared::errors::{CradleError, CradleResult};
use cradle_shared::process::ProcessSpec;
use cradle_shared::state::{ContainerState, Status};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio::sync::mpsc::UnboundedSender;

/// Caller-supplied supervisor configuration.
pub struct SupervisorConfig {
    pub container_id: String,
    pub bundle: PathBuf,

    /// Base directory under which the instance directory is created.
    pub instance_root: PathBuf,

    pub process: ProcessSpec,

    /// Container log path; defaults to `<instance-dir>/<id>.log`.
    pub log_path: Option<PathBuf>,

    /// Log format name; defaults to `kubernetes`. Unknown names fail
    /// start-up.
    pub log_format: Option<String>,

    /// Where to write the payload pid, if anywhere.
    pub pid_file: Option<PathBuf>,
}

/// The out-of-container coordinator for one container.
pub struct Supervisor {
    config: SupervisorConfig,
    instance: InstanceDir,
    state: ContainerState,
    streams: Option<HostStreams>,
    logger: Option<Arc<Logger>>,
}

impl Supervisor {
    /// Create the instance directory and publish the `creating` state.
    ///
    /// `streams` is `None` for empty-process containers, which have no
    /// payload output; the multiplexer is skipped for them and their log
    /// stays empty.
    pub fn new(config: SupervisorConfig, streams: Option<HostStreams>) -> CradleResult<Self> {
        let instance = InstanceDir::create(&config.instance_root, &config.container_id)?;
        let state = ContainerState::new(&config.container_id, &config.bundle);
        instance.write_state(&state)?;
        Ok(Self {
            config,
            instance,
            state,
            streams,
            logger: None,
        })
    }

    pub fn state(&self) -> &ContainerState {
        &self.state
    }

    pub fn instance(&self) -> &InstanceDir {
        &self.instance
    }

    pub fn logger(&self) -> Option<&Arc<Logger>> {
        self.logger.as_ref()
    }

    /// Run the setup phase while the launcher is paused, then release it
    /// and resolve the start.
    ///
    /// The caller has already consumed the launcher's pause byte (see
    /// [`SupervisorHandshake::await_paused`]). On any error the partially
    /// created sockets are removed and the release byte is never sent, so
    /// the launcher exits on channel EOF.
    pub async fn pre_start(
        &mut self,
        pid: i32,
        handshake: &mut SupervisorHandshake,
        fatal: &UnboundedSender<CradleError>,
    ) -> CradleResult<StartOutcome> {
        // The launcher is already blocked on the handshake read; the stop
        // signal additionally pins pure-exec payloads.
        let _ = kill(Pid::from_raw(pid), Signal::SIGSTOP);
        self.state.set_pid(pid);

        if let Some(hooks) = &self.config.process.hooks {
            run_hooks("prestart", &hooks.prestart, &self.state, true).await?;
        }

        let attach_path = self.instance.attach_socket_path();
        let attach_listener = UnixListener::bind(&attach_path).map_err(|e| {
            CradleError::Setup(format!("creating {}: {}", attach_path.display(), e))
        })?;
        self.state.set_annotation(
            annotations::ATTACH_SOCKET,
            attach_path.display().to_string(),
        );

        let control_path = self.instance.control_socket_path();
        let control_listener = match UnixListener::bind(&control_path) {
            Ok(listener) => listener,
            Err(e) => {
                self.instance.remove_sockets();
                return Err(CradleError::Setup(format!(
                    "creating {}: {}",
                    control_path.display(),
                    e
                )));
            }
        };
        self.state.set_annotation(
            annotations::CONTROL_SOCKET,
            control_path.display().to_string(),
        );

        let result = self
            .finish_pre_start(pid, handshake, fatal, attach_listener, control_listener)
            .await;
        if result.is_err() {
            self.instance.remove_sockets();
        }
        result
    }

    async fn finish_pre_start(
        &mut self,
        pid: i32,
        handshake: &mut SupervisorHandshake,
        fatal: &UnboundedSender<CradleError>,
        attach_listener: UnixListener,
        control_listener: UnixListener,
    ) -> CradleResult<StartOutcome> {
        let log_path = self
            .config
            .log_path
            .clone()
            .unwrap_or_else(|| self.instance.default_log_path());
        let format: LogFormat = self
            .config
            .log_format
            .as_deref()
            .unwrap_or("kubernetes")
            .parse()?;
        let logger = Logger::open(&log_path, format)?;
        self.logger = Some(Arc::clone(&logger));

        let master = self.streams.as_ref().and_then(|streams| streams.master());
        tokio::spawn(control::serve(
            control_listener,
            Arc::clone(&logger),
            master,
            fatal.clone(),
        ));

        match self.streams.take() {
            Some(streams) => {
                let mux = StreamMux::new(streams, &logger);
                tokio::spawn(mux.run(attach_listener, fatal.clone()));
            }
            None => {
                // Empty process: nothing to multiplex. Dropping the
                // listener leaves the socket file in place but refuses
                // connections.
                drop(attach_listener);
            }
        }

        if let Some(path) = &self.config.pid_file {
            write_pid_file(path, pid)?;
        }

        self.state.transition_to(Status::Created)?;
        self.instance.write_state(&self.state)?;

        handshake.send_proceed().await?;
        // The ack is queued; lifting the stop lets the launcher read it.
        let _ = kill(Pid::from_raw(pid), Signal::SIGCONT);

        handshake.await_exec().await
    }

    /// Publish `running` and run the poststart hooks (lenient).
    pub async fn post_start(&mut self) -> CradleResult<()> {
        self.state.transition_to(Status::Running)?;
        self.instance.write_state(&self.state)?;

        if let Some(hooks) = &self.config.process.hooks {
            run_hooks("poststart", &hooks.poststart, &self.state, false).await?;
        }
        Ok(())
    }

    /// The payload was reaped: publish `stopped`, run the poststop hooks
    /// (lenient), and tear down the on-disk endpoints.
    pub async fn stop(&mut self) -> CradleResult<()> {
        self.state.transition_to(Status::Stopped)?;
        self.instance.write_state(&self.state)?;

        if let Some(hooks) = &self.config.process.hooks {
            run_hooks("poststop", &hooks.poststop, &self.state, false).await?;
        }

        self.instance.remove_sockets();
        if let Some(path) = &self.config.pid_file {
            let _ = std::fs::remove_file(path);
        }
        Ok(())
    }
}

/// Driver helper: block until the payload (a direct child of this process)
/// is reaped, draining every other exited child along the way.
///
/// Returns the payload's exit code, with death-by-signal mapped to
/// `128 + signo` shell-style.
pub async fn wait_for_exit(pid: i32) -> CradleResult<i32> {
    let mut sigchld = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::child())
        .map_err(|e| CradleError::Setup(format!("installing SIGCHLD handler: {}", e)))?;

    loop {
        if let Some(code) = reap(pid)? {
            return Ok(code);
        }
        if sigchld.recv().await.is_none() {
            return Err(CradleError::Setup("SIGCHLD stream closed".into()));
        }
    }
}

/// Non-blocking reap of every exited child; `Some` once the payload is
/// among them.
fn reap(pid: i32) -> CradleResult<Option<i32>> {
    loop {
        match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::Exited(child, code)) if child.as_raw() == pid => {
                return Ok(Some(code));
            }
            Ok(WaitStatus::Signaled(child, signal, _)) if child.as_raw() == pid => {
                return Ok(Some(128 + signal as i32));
            }
            Ok(WaitStatus::StillAlive) => return Ok(None),
            Ok(_) => continue,
            Err(nix::errno::Errno::ECHILD) => {
                return Err(CradleError::Setup(
                    "payload is not a child of this process".into(),
                ));
            }
            Err(e) => {
                return Err(CradleError::Setup(format!("waiting for payload: {}", e)));
            }
        }
    }
}
