//! SIGTERM → SIGKILL escalation for a `tokio::process::Child`.

use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Child;
use tracing::debug;

#[cfg(unix)]
use tokio::time::timeout;

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// How long a server gets to save its world after SIGTERM.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(10);

/// Terminate `child` and reap it.
///
/// # Strategy
/// 1. Send SIGTERM and wait up to `grace` for the JVM shutdown hook to finish
/// 2. If still running, send SIGKILL
/// 3. Wait for reaping
///
/// On non-Unix platforms the process is killed immediately.
pub async fn shutdown_child(mut child: Child, grace: Duration) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        shutdown_unix(&mut child, grace).await
    }

    #[cfg(not(unix))]
    {
        let _ = grace;
        child.kill().await?;
        child.wait().await
    }
}

#[cfg(unix)]
async fn shutdown_unix(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // Already reaped elsewhere; wait returns the cached status.
        return child.wait().await;
    };
    let pid = i32::try_from(pid).map_err(io::Error::other)?;

    if let Err(e) = signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        if e == nix::errno::Errno::ESRCH {
            return child.wait().await;
        }
        return Err(io::Error::other(e));
    }

    if let Ok(result) = timeout(grace, child.wait()).await {
        return result;
    }

    debug!(pid, "Grace period elapsed, sending SIGKILL");
    child.kill().await?;
    child.wait().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::process::Command;

    #[tokio::test]
    #[cfg(unix)]
    async fn shutdown_responds_to_sigterm() {
        let child = Command::new("sleep")
            .arg("30")
            .spawn()
            .expect("failed to spawn sleep");

        let status = shutdown_child(child, Duration::from_secs(5)).await.unwrap();
        assert!(!status.success());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn shutdown_escalates_when_sigterm_is_ignored() {
        let child = Command::new("sh")
            .args(["-c", "trap '' TERM; sleep 30"])
            .spawn()
            .expect("failed to spawn sh");

        let result = shutdown_child(child, Duration::from_millis(200)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn shutdown_handles_already_exited() {
        let mut child = Command::new("true").spawn().expect("failed to spawn true");
        let _ = child.wait().await;

        let result = shutdown_child(child, DEFAULT_KILL_GRACE).await;
        assert!(result.is_ok());
    }
}
