//! Composition root for one supervised server.
//!
//! `Server` wires the pieces together: the supervisor's output feeds a pump
//! task that splits lines per stream, runs them through the state tracker in
//! arrival order and publishes on the event bus. The command channel writes
//! through the supervisor and listens on the same bus.
//!
//! Fatal conditions reported in the log (EULA, startup failure) are recorded
//! by the pump and surface from [`Server::wait_ready`] and [`Server::wait`].

use crate::command::{CommandChannel, CommandReply, SendOptions};
use crate::process::{OutputChunk, ProcessStatus, ProcessSupervisor, StreamKind};
use mcvisor_core::{
    CommandError, EventBus, FatalCondition, LaunchConfig, LineBuffer, ProcessError,
    ServerEvent, ServerState, SettingsError, StateHandle, StateTracker, Subscription,
    SupervisorSettings, Topic, parse_line, validate_settings,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

/// How long output is still read after the process has exited.
pub const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Errors that end the launch/run of a server.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("Fatal server condition: {0}")]
    Fatal(#[from] FatalCondition),

    #[error("Server exited before it was ready (exit code {code:?})")]
    ExitedBeforeReady { code: Option<i32> },

    #[error("Server was not ready within {0:?}")]
    StartupTimeout(Duration),
}

/// What the pump has observed so far.
#[derive(Debug, Clone, Default)]
struct RunState {
    /// Elapsed seconds from the `Done` line.
    ready: Option<f64>,
    /// First fatal condition seen.
    fatal: Option<FatalCondition>,
    /// Set once the process has been reaped and its output drained.
    exited: Option<Option<i32>>,
}

/// Builder that allows subscribing before any output is processed.
pub struct ServerBuilder {
    config: LaunchConfig,
    settings: SupervisorSettings,
    bus: Arc<EventBus>,
}

impl ServerBuilder {
    pub fn new(config: LaunchConfig) -> Self {
        Self {
            config,
            settings: SupervisorSettings::with_defaults(),
            bus: Arc::new(EventBus::new()),
        }
    }

    #[must_use]
    pub fn settings(mut self, settings: SupervisorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Subscribe now so that even the first lines are delivered.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.bus.subscribe(topic)
    }

    pub fn subscribe_all(&self) -> Subscription {
        self.bus.subscribe_all()
    }

    /// Spawn the process and start tracking its output.
    pub fn launch(self) -> Result<Server, LaunchError> {
        validate_settings(&self.settings)?;

        let (supervisor, output) = ProcessSupervisor::start(&self.config)?;
        let supervisor = Arc::new(supervisor);
        let tracker = StateTracker::new(self.bus.clone(), &self.settings);
        let state = tracker.state();
        let (run_tx, run_rx) = watch::channel(RunState::default());
        // Subscribed before any line is tracked.
        let ready = self.bus.subscribe(Topic::Ready);

        tokio::spawn(pump(
            output,
            LineRouter::new(tracker, ready, run_tx),
            supervisor.pid(),
            supervisor.subscribe_status(),
            self.bus.clone(),
        ));

        let commands = CommandChannel::new(
            supervisor.clone(),
            self.bus.clone(),
            state.clone(),
            &self.settings,
        );

        Ok(Server {
            supervisor,
            bus: self.bus,
            state,
            commands,
            run: run_rx,
            startup_timeout: self.settings.effective_startup_timeout(),
        })
    }
}

/// A running, supervised server.
///
/// Dropping a `Server` without [`stop`](Server::stop) terminates the process
/// (SIGTERM, then SIGKILL after a grace period) instead of leaving it running.
pub struct Server {
    supervisor: Arc<ProcessSupervisor>,
    bus: Arc<EventBus>,
    state: StateHandle,
    commands: CommandChannel,
    run: watch::Receiver<RunState>,
    startup_timeout: Option<Duration>,
}

impl Server {
    pub fn builder(config: LaunchConfig) -> ServerBuilder {
        ServerBuilder::new(config)
    }

    /// Launch with the given settings.
    pub fn launch(config: LaunchConfig, settings: SupervisorSettings) -> Result<Self, LaunchError> {
        ServerBuilder::new(config).settings(settings).launch()
    }

    pub fn pid(&self) -> u32 {
        self.supervisor.pid()
    }

    pub fn process_status(&self) -> ProcessStatus {
        self.supervisor.status()
    }

    /// Receiver for process lifecycle changes.
    pub fn subscribe_status(&self) -> watch::Receiver<ProcessStatus> {
        self.supervisor.subscribe_status()
    }

    /// Snapshot of the tracked state.
    pub fn state(&self) -> ServerState {
        self.state.snapshot()
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.bus.subscribe(topic)
    }

    pub fn commands(&self) -> &CommandChannel {
        &self.commands
    }

    /// Wait for the `Done` line and return the reported startup seconds.
    pub async fn wait_ready(&self) -> Result<f64, LaunchError> {
        let mut run = self.run.clone();
        let settled = async {
            run.wait_for(|s| s.ready.is_some() || s.fatal.is_some() || s.exited.is_some())
                .await
                .map(|s| s.clone())
                .unwrap_or_default()
        };
        let observed = match self.startup_timeout {
            Some(limit) => tokio::time::timeout(limit, settled)
                .await
                .map_err(|_| LaunchError::StartupTimeout(limit))?,
            None => settled.await,
        };

        if let Some(condition) = observed.fatal {
            return Err(condition.into());
        }
        match observed.ready {
            Some(elapsed) => Ok(elapsed),
            None => Err(LaunchError::ExitedBeforeReady {
                code: observed.exited.flatten(),
            }),
        }
    }

    pub async fn send(&self, command: &str) -> Result<CommandReply, CommandError> {
        self.commands.send(command).await
    }

    pub async fn send_probed(&self, command: &str) -> Result<CommandReply, CommandError> {
        self.commands.send_probed(command).await
    }

    pub async fn send_with(
        &self,
        command: &str,
        options: SendOptions,
    ) -> Result<CommandReply, CommandError> {
        self.commands.send_with(command, options).await
    }

    /// Ask the server to stop and wait for it to exit.
    ///
    /// The `stop` reply is not awaited; the server may exit before printing one.
    pub async fn stop(&self) -> Result<Option<i32>, LaunchError> {
        info!(pid = self.pid(), "Stopping server");
        match self.supervisor.write(b"stop\n").await {
            Ok(()) | Err(ProcessError::NotRunning) => {}
            Err(e) => return Err(e.into()),
        }
        self.wait().await
    }

    /// Terminate the process without asking and wait for it.
    pub async fn kill(&self) -> Result<Option<i32>, LaunchError> {
        self.supervisor.kill().await;
        self.wait().await
    }

    /// Wait for the process to exit and its output to be processed.
    ///
    /// Output still arriving from descendants that inherited the pipes is
    /// read for at most [`OUTPUT_DRAIN_GRACE`] after the exit.
    ///
    /// Fails with the fatal condition if the server reported one.
    pub async fn wait(&self) -> Result<Option<i32>, LaunchError> {
        let mut run = self.run.clone();
        let observed = run
            .wait_for(|s| s.exited.is_some())
            .await
            .map(|s| s.clone())
            .unwrap_or_default();

        match observed.fatal {
            Some(condition) => Err(condition.into()),
            None => Ok(observed.exited.flatten()),
        }
    }
}

/// Feed output through the tracker until the process exits, then record the exit.
///
/// Output is read to EOF when possible. If the process has exited but a
/// descendant still holds its pipes, reading stops after [`OUTPUT_DRAIN_GRACE`].
async fn pump(
    mut output: mpsc::UnboundedReceiver<OutputChunk>,
    mut lines: LineRouter,
    pid: u32,
    mut status: watch::Receiver<ProcessStatus>,
    bus: Arc<EventBus>,
) {
    let code = loop {
        tokio::select! {
            chunk = output.recv() => match chunk {
                Some(chunk) => lines.feed(&chunk),
                None => {
                    debug!(pid, "Output ended, waiting for exit");
                    break exit_code(&mut status).await;
                }
            },
            code = exit_code(&mut status) => {
                let deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
                loop {
                    match tokio::time::timeout_at(deadline, output.recv()).await {
                        Ok(Some(chunk)) => lines.feed(&chunk),
                        Ok(None) => break,
                        Err(_) => {
                            debug!(pid, "Output still open after exit, a descendant holds the pipes");
                            break;
                        }
                    }
                }
                break code;
            }
        }
    };

    lines.finish();
    lines.run.send_modify(|s| s.exited = Some(code));
    bus.close();
}

async fn exit_code(status: &mut watch::Receiver<ProcessStatus>) -> Option<i32> {
    status
        .wait_for(ProcessStatus::is_exited)
        .await
        .ok()
        .and_then(|s| s.exit_code())
}

/// Splits each stream into lines and runs them through the tracker.
struct LineRouter {
    tracker: StateTracker,
    stdout: LineBuffer,
    stderr: LineBuffer,
    ready: Subscription,
    run: watch::Sender<RunState>,
}

impl LineRouter {
    fn new(tracker: StateTracker, ready: Subscription, run: watch::Sender<RunState>) -> Self {
        Self {
            tracker,
            stdout: LineBuffer::new(),
            stderr: LineBuffer::new(),
            ready,
            run,
        }
    }

    fn feed(&mut self, chunk: &OutputChunk) {
        let buffer = match chunk.stream {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        };
        for line in buffer.push(&chunk.bytes) {
            self.track(&line);
        }
    }

    /// Flush unterminated trailing lines.
    fn finish(&mut self) {
        for rest in [self.stdout.finish(), self.stderr.finish()].into_iter().flatten() {
            self.track(&rest);
        }
    }

    fn track(&mut self, text: &str) {
        let outcome = self.tracker.process(&parse_line(text));

        if let Some(ServerEvent::Ready(elapsed)) = self.ready.try_recv() {
            self.run.send_modify(|s| s.ready = Some(elapsed));
        }
        if let Err(condition) = outcome {
            self.run.send_if_modified(|s| {
                if s.fatal.is_some() {
                    return false;
                }
                s.fatal = Some(condition);
                true
            });
        }
    }
}
