//! Lifecycle hook execution.
//!
//! Hooks are external programs that receive the container state document as
//! JSON on stdin. Prestart failures abort start-up; poststart and poststop
//! failures are logged and ignored.

use cradle_shared::errors::{CradleError, CradleResult};
use cradle_shared::process::Hook;
use cradle_shared::state::ContainerState;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Run every hook of a phase in order.
///
/// With `strict` the first failure aborts; otherwise failures are warnings.
pub async fn run_hooks(
    phase: &'static str,
    hooks: &[Hook],
    state: &ContainerState,
    strict: bool,
) -> CradleResult<()> {
    for hook in hooks {
        match run_hook(hook, state).await {
            Ok(()) => {}
            Err(e) if strict => return Err(e),
            Err(e) => {
                tracing::warn!(phase, hook = %hook.path.display(), "{}", e);
            }
        }
    }
    Ok(())
}

/// Run a single hook to completion, feeding it the state document.
pub async fn run_hook(hook: &Hook, state: &ContainerState) -> CradleResult<()> {
    let payload = serde_json::to_vec(state)
        .map_err(|e| CradleError::Hook(format!("encoding state for hook: {}", e)))?;

    let mut command = Command::new(&hook.path);
    command
        .args(&hook.args)
        .env_clear()
        .envs(hook.env.iter().filter_map(|e| e.split_once('=')))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| {
        CradleError::Hook(format!("spawning hook {}: {}", hook.path.display(), e))
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        // Feed the state concurrently; a hook that never reads stdin must
        // not deadlock against a full pipe.
        tokio::spawn(async move {
            let _ = stdin.write_all(&payload).await;
        });
    }

    let wait = child.wait_with_output();
    let output = match hook.timeout_secs {
        Some(secs) => tokio::time::timeout(Duration::from_secs(secs), wait)
            .await
            .map_err(|_| {
                CradleError::Hook(format!(
                    "hook {} timed out after {}s",
                    hook.path.display(),
                    secs
                ))
            })?,
        None => wait.await,
    }
    .map_err(|e| CradleError::Hook(format!("waiting for hook {}: {}", hook.path.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CradleError::Hook(format!(
            "hook {} exited with {}: {}",
            hook.path.display(),
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ContainerState {
        ContainerState::new("c1", "/bundle")
    }

    fn hook(path: &str, args: &[&str]) -> Hook {
        Hook {
            path: path.into(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: vec![],
            timeout_secs: None,
        }
    }

    #[tokio::test]
    async fn test_successful_hook() {
        run_hook(&hook("/bin/true", &[]), &state()).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_hook_reports_status() {
        let err = run_hook(&hook("/bin/false", &[]), &state())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[tokio::test]
    async fn test_missing_hook_binary() {
        let err = run_hook(&hook("/no/such/hook", &[]), &state())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("spawning hook"));
    }

    #[tokio::test]
    async fn test_hook_receives_state_on_stdin() {
        // `grep -q` exits 0 only if the id shows up on stdin.
        let ok = hook("/bin/sh", &["-c", "grep -q '\"id\":\"c1\"'"]);
        run_hook(&ok, &state()).await.unwrap();

        let miss = hook("/bin/sh", &["-c", "grep -q '\"id\":\"other\"'"]);
        assert!(run_hook(&miss, &state()).await.is_err());
    }

    #[tokio::test]
    async fn test_hook_timeout() {
        let mut slow = hook("/bin/sleep", &["5"]);
        slow.timeout_secs = Some(1);
        let err = run_hook(&slow, &state()).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_strict_phase_aborts_on_first_failure() {
        let hooks = vec![hook("/bin/false", &[]), hook("/bin/true", &[])];
        let err = run_hooks("prestart", &hooks, &state(), true)
            .await
            .unwrap_err();
        assert!(matches!(err, CradleError::Hook(_)));
    }

    #[tokio::test]
    async fn test_lenient_phase_continues() {
        let hooks = vec![hook("/bin/false", &[]), hook("/bin/true", &[])];
        run_hooks("poststart", &hooks, &state(), false)
            .await
            .unwrap();
    }
}
