//! Console command submission and reply correlation.
//!
//! The server gives no machine-readable acknowledgment for console
//! commands. Replies are correlated by order: a request subscribes to the
//! generic info channel before writing, then takes what follows.
//!
//! - **Plain** sends resolve with the next info message and no verdict.
//! - **Probed** sends run the probe cell protocol (reset, wrapped command,
//!   readback) to recover a success flag. The cell is a single shared slot,
//!   so probed sends are serialized; plain sends are not.
//!
//! Each probe step waits for its recognizable acknowledgment line rather
//! than for a fixed delay. Abandoning a probed send midway (timeout,
//! cancellation, dropping the future) leaves its remaining replies in the
//! stream; the next probe's reset realigns on the first acknowledgment it
//! sees, which may belong to the abandoned sequence.

mod probe;

use mcvisor_core::{
    CommandError, CommandSink, EventBus, LogLevel, ServerEvent, StateHandle, Subscription,
    SupervisorSettings, Topic,
};
use probe::{ProbeCell, Readback};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Reply to a console command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    /// For plain sends, the message that followed the command. For probed
    /// sends, the message just before the readback.
    pub message: String,
    /// Probe verdict. Always `None` for plain sends.
    pub success: Option<bool>,
}

/// How long a send may wait for its reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Deadline {
    /// Use the channel's configured command timeout.
    #[default]
    Default,
    After(Duration),
    Never,
}

/// Per-call options for [`CommandChannel::send_with`].
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub probe: bool,
    pub deadline: Deadline,
    pub cancel: Option<CancellationToken>,
}

impl SendOptions {
    pub fn plain() -> Self {
        Self::default()
    }

    pub fn probed() -> Self {
        Self {
            probe: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Command writer and reply correlator for one server.
pub struct CommandChannel {
    sink: Arc<dyn CommandSink>,
    bus: Arc<EventBus>,
    state: StateHandle,
    probe: ProbeCell,
    /// Held for the whole probe sequence.
    probe_lock: Mutex<()>,
    default_timeout: Option<Duration>,
}

impl CommandChannel {
    pub fn new(
        sink: Arc<dyn CommandSink>,
        bus: Arc<EventBus>,
        state: StateHandle,
        settings: &SupervisorSettings,
    ) -> Self {
        Self {
            sink,
            bus,
            state,
            probe: ProbeCell::new(
                settings.effective_probe_storage(),
                settings.effective_probe_path(),
            ),
            probe_lock: Mutex::new(()),
            default_timeout: settings.effective_command_timeout(),
        }
    }

    /// Send a command and resolve with the next info message.
    pub async fn send(&self, command: &str) -> Result<CommandReply, CommandError> {
        self.send_with(command, SendOptions::plain()).await
    }

    /// Send a command through the probe protocol to learn whether it succeeded.
    pub async fn send_probed(&self, command: &str) -> Result<CommandReply, CommandError> {
        self.send_with(command, SendOptions::probed()).await
    }

    pub async fn send_with(
        &self,
        command: &str,
        options: SendOptions,
    ) -> Result<CommandReply, CommandError> {
        if command.contains(['\n', '\r']) {
            return Err(CommandError::Malformed(command.to_string()));
        }
        if !self.state.is_ready() {
            return Err(CommandError::NotReady);
        }

        let limit = match options.deadline {
            Deadline::Default => self.default_timeout,
            Deadline::After(limit) => Some(limit),
            Deadline::Never => None,
        };
        let cancel = options.cancel.unwrap_or_default();

        let exchange = async {
            if options.probe {
                self.exchange_probed(command).await
            } else {
                self.exchange_plain(command).await
            }
        };
        let bounded = async {
            match limit {
                Some(limit) => tokio::time::timeout(limit, exchange)
                    .await
                    .unwrap_or_else(|_| Err(CommandError::Timeout(command.to_string()))),
                None => exchange.await,
            }
        };

        let result = tokio::select! {
            result = bounded => result,
            () = cancel.cancelled() => Err(CommandError::Cancelled(command.to_string())),
        };
        if let Err(e) = &result {
            warn!(%command, error = %e, "Command failed");
        }
        result
    }

    async fn exchange_plain(&self, command: &str) -> Result<CommandReply, CommandError> {
        let mut replies = self.subscribe_replies();
        self.sink.write_line(command).await?;

        let (message, _) = next_message(&mut replies, command).await?;
        debug!(%command, reply = %message, "Plain command resolved");
        Ok(CommandReply {
            message,
            success: None,
        })
    }

    async fn exchange_probed(&self, command: &str) -> Result<CommandReply, CommandError> {
        let _cell = self.probe_lock.lock().await;
        let mut replies = self.subscribe_replies();

        self.sink.write_line(&self.probe.reset_command()).await?;
        loop {
            let (message, _) = next_message(&mut replies, command).await?;
            if self.probe.is_reset_ack(&message) {
                break;
            }
        }

        // The console runs commands in input order, so the readback follows
        // everything the wrapped command prints.
        self.sink.write_line(&self.probe.wrap(command)).await?;
        self.sink.write_line(&self.probe.read_command()).await?;

        loop {
            let (message, previous) = next_message(&mut replies, command).await?;
            match self.probe.readback(&message) {
                Some(Readback::Stored(success)) => {
                    let message = previous.unwrap_or_default();
                    debug!(%command, %success, reply = %message, "Probed command resolved");
                    return Ok(CommandReply {
                        message,
                        success: Some(success),
                    });
                }
                Some(Readback::Missing) => {
                    return Err(CommandError::InvalidCommand(command.to_string()));
                }
                None => {}
            }
        }
    }

    fn subscribe_replies(&self) -> Subscription {
        self.bus.subscribe(Topic::Log(LogLevel::Info))
    }
}

/// Next generic message and the one before it.
async fn next_message(
    replies: &mut Subscription,
    command: &str,
) -> Result<(String, Option<String>), CommandError> {
    loop {
        match replies.recv().await {
            Some(ServerEvent::Log(event)) => return Ok((event.message, event.previous)),
            Some(_) => {}
            None => return Err(CommandError::ProcessExited(command.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcvisor_core::{ProcessError, StateTracker, parse_line};
    use parking_lot::Mutex as SyncMutex;
    use tokio_test::{assert_pending, assert_ready, task};

    type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

    /// Feeds scripted console output through a real tracker on every write.
    struct ScriptedConsole {
        tracker: SyncMutex<StateTracker>,
        written: SyncMutex<Vec<String>>,
        respond: SyncMutex<Responder>,
    }

    impl ScriptedConsole {
        fn emit(&self, message: &str) {
            let line = parse_line(&format!("[12:00:00] [Server thread/INFO]: {message}"));
            self.tracker.lock().process(&line).unwrap();
        }

        fn written(&self) -> Vec<String> {
            self.written.lock().clone()
        }
    }

    #[async_trait]
    impl CommandSink for ScriptedConsole {
        async fn write_line(&self, line: &str) -> Result<(), ProcessError> {
            self.written.lock().push(line.to_string());
            let replies = {
                let mut respond = self.respond.lock();
                (*respond)(line)
            };
            for reply in replies {
                self.emit(&reply);
            }
            Ok(())
        }
    }

    fn silent() -> Responder {
        Box::new(|_: &str| Vec::new())
    }

    /// Vanilla-like console: `say` succeeds, `ban` fails, anything else does not parse.
    fn vanilla() -> Responder {
        const WRAPPED: &str = "execute store success storage mcvisor:probe success int 1 run ";
        let mut stored: Option<u8> = None;
        Box::new(move |line: &str| {
            if line.starts_with("data remove storage") {
                let reply = match stored.take() {
                    Some(_) => "Modified storage mcvisor:probe",
                    None => "Found no elements matching success",
                };
                vec![reply.to_string()]
            } else if let Some(inner) = line.strip_prefix(WRAPPED) {
                if let Some(text) = inner.strip_prefix("say ") {
                    stored = Some(1);
                    vec![format!("[Server] {text}")]
                } else if inner.starts_with("ban ") {
                    stored = Some(0);
                    vec!["That player does not exist".to_string()]
                } else {
                    vec![
                        "Unknown or incomplete command, see below for error".to_string(),
                        format!("...{inner}<--[HERE]"),
                    ]
                }
            } else if line.starts_with("data get storage") {
                match stored {
                    Some(v) => vec![format!(
                        "Storage mcvisor:probe has the following contents: {v}"
                    )],
                    None => vec!["Found no elements matching success".to_string()],
                }
            } else if let Some(text) = line.strip_prefix("say ") {
                vec![format!("[Server] {text}")]
            } else {
                Vec::new()
            }
        })
    }

    fn setup(
        ready: bool,
        respond: Responder,
    ) -> (CommandChannel, Arc<ScriptedConsole>, Arc<EventBus>) {
        let settings = SupervisorSettings::with_defaults();
        let bus = Arc::new(EventBus::new());
        let tracker = StateTracker::new(bus.clone(), &settings);
        let state = tracker.state();
        let console = Arc::new(ScriptedConsole {
            tracker: SyncMutex::new(tracker),
            written: SyncMutex::new(Vec::new()),
            respond: SyncMutex::new(respond),
        });
        if ready {
            console.emit("Done (1.000s)! For help, type \"help\"");
        }
        let channel = CommandChannel::new(console.clone(), bus.clone(), state, &settings);
        (channel, console, bus)
    }

    #[tokio::test]
    async fn test_not_ready_rejects() {
        let (channel, console, _bus) = setup(false, vanilla());
        assert!(matches!(
            channel.send("say hi").await,
            Err(CommandError::NotReady)
        ));
        assert!(console.written().is_empty());
    }

    #[tokio::test]
    async fn test_multiline_command_rejected() {
        let (channel, _console, _bus) = setup(true, vanilla());
        assert!(matches!(
            channel.send("say hi\nstop").await,
            Err(CommandError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_plain_send_resolves_with_next_message() {
        let (channel, _console, _bus) = setup(true, vanilla());
        let reply = channel.send("say hi").await.unwrap();
        assert_eq!(
            reply,
            CommandReply {
                message: "[Server] hi".into(),
                success: None,
            }
        );
    }

    #[tokio::test]
    async fn test_probed_success() {
        let (channel, console, _bus) = setup(true, vanilla());
        let reply = channel.send_probed("say hi").await.unwrap();
        assert_eq!(reply.message, "[Server] hi");
        assert_eq!(reply.success, Some(true));
        assert_eq!(
            console.written(),
            vec![
                "data remove storage mcvisor:probe success",
                "execute store success storage mcvisor:probe success int 1 run say hi",
                "data get storage mcvisor:probe success",
            ]
        );
    }

    #[tokio::test]
    async fn test_probed_failure() {
        let (channel, _console, _bus) = setup(true, vanilla());
        let reply = channel.send_probed("ban e").await.unwrap();
        assert_eq!(reply.message, "That player does not exist");
        assert_eq!(reply.success, Some(false));
    }

    #[tokio::test]
    async fn test_probed_unknown_command_is_invalid() {
        let (channel, _console, _bus) = setup(true, vanilla());
        let err = channel.send_probed("e").await.unwrap_err();
        assert!(matches!(err, CommandError::InvalidCommand(ref c) if c == "e"));
    }

    #[tokio::test]
    async fn test_back_to_back_probes_do_not_interleave() {
        let (channel, console, _bus) = setup(true, vanilla());
        let (a, b) = tokio::join!(channel.send_probed("say a"), channel.send_probed("ban b"));
        assert_eq!(a.unwrap().success, Some(true));
        assert_eq!(b.unwrap().success, Some(false));

        let written = console.written();
        let kinds: Vec<&str> = written
            .iter()
            .map(|w| {
                if w.starts_with("data remove") {
                    "reset"
                } else if w.starts_with("execute") {
                    "store"
                } else {
                    "read"
                }
            })
            .collect();
        assert_eq!(kinds, ["reset", "store", "read", "reset", "store", "read"]);
        assert!(written[1].ends_with("run say a"));
        assert!(written[4].ends_with("run ban b"));
    }

    #[tokio::test]
    async fn test_plain_send_waits_for_output() {
        let (channel, console, _bus) = setup(true, silent());
        let mut send = task::spawn(channel.send("list"));
        assert_pending!(send.poll());

        console.emit("There are 0 of a max of 20 players online: ");
        let reply = assert_ready!(send.poll()).unwrap();
        assert_eq!(reply.message, "There are 0 of a max of 20 players online: ");
    }

    #[tokio::test]
    async fn test_timeout() {
        let (channel, _console, _bus) = setup(true, silent());
        let options = SendOptions::plain().with_deadline(Deadline::After(Duration::from_millis(20)));
        let err = channel.send_with("list", options).await.unwrap_err();
        assert!(matches!(err, CommandError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let (channel, _console, _bus) = setup(true, silent());
        let token = CancellationToken::new();
        token.cancel();
        let options = SendOptions::probed()
            .with_deadline(Deadline::Never)
            .with_cancel(token);
        let err = channel.send_with("say hi", options).await.unwrap_err();
        assert!(matches!(err, CommandError::Cancelled(_)));
    }

    #[tokio::test]
    async fn test_closed_bus_fails_pending_command() {
        let (channel, _console, bus) = setup(true, silent());
        bus.close();
        let err = channel.send("list").await.unwrap_err();
        assert!(matches!(err, CommandError::ProcessExited(_)));
    }
}
