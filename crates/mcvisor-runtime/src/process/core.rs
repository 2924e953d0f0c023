//! Child process ownership for one supervised server.
//!
//! `ProcessSupervisor` spawns the server, exposes its stdin as a serialized
//! line writer and its stdout/stderr as an ordered stream of raw chunks, and
//! reports lifecycle status. It does no parsing.

use super::events::ProcessStatus;
use super::shutdown::{DEFAULT_KILL_GRACE, shutdown_child};
use super::stream::spawn_stream_reader;
use super::types::{OutputChunk, StreamKind};
use async_trait::async_trait;
use mcvisor_core::{CommandSink, LaunchConfig, ProcessError};
use parking_lot::Mutex as SyncMutex;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// Owner of the child process handle.
///
/// Dropping the supervisor terminates the child the same way [`kill`] does.
///
/// [`kill`]: ProcessSupervisor::kill
pub struct ProcessSupervisor {
    pid: u32,
    /// `None` once a write has found the pipe closed.
    stdin: Mutex<Option<ChildStdin>>,
    status: watch::Receiver<ProcessStatus>,
    kill: SyncMutex<Option<oneshot::Sender<()>>>,
}

impl ProcessSupervisor {
    /// Spawn the configured process.
    ///
    /// Returns the supervisor and the receiver of its output chunks. The
    /// receiver ends once both output streams reach EOF. Must be called from
    /// within a Tokio runtime.
    pub fn start(
        config: &LaunchConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<OutputChunk>), ProcessError> {
        if !config.working_dir.is_dir() {
            return Err(ProcessError::InvalidWorkingDir(config.working_dir.clone()));
        }

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .current_dir(&config.working_dir)
            .envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::Spawn {
                program: config.program.clone(),
                reason: e.to_string(),
            })?;

        let pid = child.id().ok_or_else(|| ProcessError::Spawn {
            program: config.program.clone(),
            reason: "process exited before its PID could be read".to_string(),
        })?;
        info!(pid, program = %config.program.display(), "Spawned server process");

        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_stream_reader(stdout, StreamKind::Stdout, pid, chunk_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_stream_reader(stderr, StreamKind::Stderr, pid, chunk_tx);
        }
        let stdin = child.stdin.take();

        let (status_tx, status_rx) = watch::channel(ProcessStatus::Running { pid });
        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(reap(child, pid, status_tx, kill_rx));

        Ok((
            Self {
                pid,
                stdin: Mutex::new(stdin),
                status: status_rx,
                kill: SyncMutex::new(Some(kill_tx)),
            },
            chunk_rx,
        ))
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Current lifecycle status.
    pub fn status(&self) -> ProcessStatus {
        *self.status.borrow()
    }

    /// Receiver for lifecycle changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ProcessStatus> {
        self.status.clone()
    }

    pub fn has_exited(&self) -> bool {
        self.status.borrow().is_exited()
    }

    /// Append raw bytes to the process input.
    ///
    /// Writes are serialized; each call reaches the pipe whole.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), ProcessError> {
        if self.has_exited() {
            return Err(ProcessError::NotRunning);
        }

        let mut guard = self.stdin.lock().await;
        let stdin = guard.as_mut().ok_or(ProcessError::NotRunning)?;
        let result = match stdin.write_all(bytes).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!(pid = self.pid, "stdin closed, process is gone");
                *guard = None;
                Err(ProcessError::NotRunning)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for the process to exit and return its exit code.
    pub async fn wait(&self) -> Option<i32> {
        let mut status = self.status.clone();
        match status.wait_for(ProcessStatus::is_exited).await {
            Ok(exited) => exited.exit_code(),
            // The reaper only drops its sender after publishing the exit.
            Err(_) => None,
        }
    }

    /// Terminate the process (SIGTERM, then SIGKILL) and wait for it.
    pub async fn kill(&self) -> Option<i32> {
        if let Some(kill) = self.kill.lock().take() {
            warn!(pid = self.pid, "Force-stopping server process");
            let _ = kill.send(());
        }
        self.wait().await
    }
}

#[async_trait]
impl CommandSink for ProcessSupervisor {
    async fn write_line(&self, line: &str) -> Result<(), ProcessError> {
        debug!(pid = self.pid, command = %line, "Writing command");
        self.write(format!("{line}\n").as_bytes()).await
    }
}

/// Own the child until it exits, then publish the exit exactly once.
///
/// A kill request or a dropped supervisor (closed `kill`) ends it early.
async fn reap(
    mut child: Child,
    pid: u32,
    status: watch::Sender<ProcessStatus>,
    kill: oneshot::Receiver<()>,
) {
    let waited = tokio::select! {
        result = child.wait() => Some(result),
        _ = kill => None,
    };
    let result = match waited {
        Some(result) => result,
        None => shutdown_child(child, DEFAULT_KILL_GRACE).await,
    };

    let code = match result {
        Ok(exit) => exit.code(),
        Err(e) => {
            warn!(pid, error = %e, "Failed to reap server process");
            None
        }
    };
    info!(pid, code = ?code, "Server process exited");
    let _ = status.send(ProcessStatus::Exited { code });
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcvisor_core::LineBuffer;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_invalid_working_dir() {
        let config = LaunchConfig::new("sh", "/definitely/not/a/dir");
        let err = ProcessSupervisor::start(&config).err().unwrap();
        assert!(matches!(err, ProcessError::InvalidWorkingDir(_)));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let dir = TempDir::new().unwrap();
        let config = LaunchConfig::new("mcvisor-no-such-binary", dir.path());
        let err = ProcessSupervisor::start(&config).err().unwrap();
        assert!(matches!(err, ProcessError::Spawn { .. }));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_echo_round_trip_and_exit() {
        let dir = TempDir::new().unwrap();
        let config = LaunchConfig::new("sh", dir.path())
            .arg("-c")
            .arg("read line; echo \"got $line\"; exit 3");
        let (supervisor, mut output) = ProcessSupervisor::start(&config).unwrap();
        assert_eq!(supervisor.status(), ProcessStatus::Running { pid: supervisor.pid() });

        supervisor.write_line("hello").await.unwrap();

        let mut buffer = LineBuffer::new();
        let mut lines = Vec::new();
        while let Some(chunk) = output.recv().await {
            if chunk.stream == StreamKind::Stdout {
                lines.extend(buffer.push(&chunk.bytes));
            }
        }
        assert_eq!(lines, vec!["got hello".to_string()]);
        assert_eq!(supervisor.wait().await, Some(3));
        assert!(supervisor.has_exited());
        assert!(matches!(
            supervisor.write_line("late").await,
            Err(ProcessError::NotRunning)
        ));
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_drop_terminates() {
        let dir = TempDir::new().unwrap();
        let config = LaunchConfig::new("sleep", dir.path()).arg("30");
        let (supervisor, _output) = ProcessSupervisor::start(&config).unwrap();
        let mut status = supervisor.subscribe_status();
        drop(supervisor);

        let exited = tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(ProcessStatus::is_exited),
        )
        .await
        .expect("child outlived its supervisor")
        .map(|s| *s)
        .unwrap();
        assert_eq!(exited, ProcessStatus::Exited { code: None });
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_kill_terminates() {
        let dir = TempDir::new().unwrap();
        let config = LaunchConfig::new("sleep", dir.path()).arg("30");
        let (supervisor, _output) = ProcessSupervisor::start(&config).unwrap();
        let code = supervisor.kill().await;
        assert_eq!(code, None);
        assert!(supervisor.has_exited());
    }
}
