//! Derives structured server state from parsed log lines.
//!
//! The tracker consumes lines in arrival order, checks each message against
//! a fixed catalogue of message shapes (independently, so one line can hit
//! several), updates [`ServerState`] and publishes one event per recognized
//! fact. Every line then produces a generic [`ServerEvent::Log`].
//!
//! Player logins are two-phase: the authenticator thread logs the UUID
//! first, the main thread logs the session details later. The first creates
//! a pending login keyed by name, the second promotes it into the roster.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::domain::{
    Coordinates, LogLevel, LogLine, PendingPlayerLogin, PlayerSession, ServerState, StateHandle,
};
use crate::error::FatalCondition;
use crate::events::{EventBus, LogEvent, ServerEvent};
use crate::settings::SupervisorSettings;

const EULA_MESSAGE: &str =
    "You need to agree to the EULA in order to run the server. Go to eula.txt for more info.";
const STARTUP_FAILED_MESSAGE: &str = "Failed to start the minecraft server";

/// Two-slot history of generic info messages, kept once the server is ready.
#[derive(Debug, Default)]
struct MessageHistory {
    previous: Option<String>,
    current: Option<String>,
}

impl MessageHistory {
    /// Shift in `message`, returning the one it displaced.
    fn push(&mut self, message: &str) -> Option<String> {
        self.previous = self.current.replace(message.to_string());
        self.previous.clone()
    }
}

/// Per-server log interpreter.
pub struct StateTracker {
    bus: Arc<EventBus>,
    state: StateHandle,
    pending_logins: HashMap<String, PendingPlayerLogin>,
    /// `None` until the `Done` line.
    history: Option<MessageHistory>,
    /// Last spawn progress published.
    announced_progress: Option<u8>,
    main_thread: String,
    authenticator_prefix: String,
}

impl StateTracker {
    pub fn new(bus: Arc<EventBus>, settings: &SupervisorSettings) -> Self {
        Self {
            bus,
            state: StateHandle::new(),
            pending_logins: HashMap::new(),
            history: None,
            announced_progress: None,
            main_thread: settings.effective_main_thread().to_string(),
            authenticator_prefix: settings.effective_authenticator_thread_prefix().to_string(),
        }
    }

    /// Read handle on the tracked state.
    pub fn state(&self) -> StateHandle {
        self.state.clone()
    }

    /// Whether a login for `name` is waiting for its session line.
    pub fn is_pending(&self, name: &str) -> bool {
        self.pending_logins.contains_key(name)
    }

    pub fn pending_count(&self) -> usize {
        self.pending_logins.len()
    }

    /// Interpret one line.
    ///
    /// The generic event is always published, even for a line that reports
    /// a fatal condition; the condition is then returned to the caller.
    pub fn process(&mut self, line: &LogLine) -> Result<(), FatalCondition> {
        let message = line.message.as_str();

        if let Some(pairs) = message.strip_prefix("Environment: ") {
            self.bus
                .publish(ServerEvent::Environment(parse_environment(pairs)));
        }

        if let Some(version) = message.strip_prefix("Starting minecraft server version ") {
            info!(%version, "Server version detected");
            self.state.update(|s| s.version = Some(version.to_string()));
            self.bus.publish(ServerEvent::Version(version.to_string()));
        }

        if let Some(address) = message.strip_prefix("Starting Minecraft server on ") {
            self.on_listen(address);
        }

        if let Some(rest) = message.strip_prefix("Preparing level \"") {
            let world = rest.strip_suffix('"').unwrap_or(rest).to_string();
            self.state.update(|s| s.world = Some(world.clone()));
            self.bus.publish(ServerEvent::World(world));
        }

        if let Some(rest) = message.strip_prefix("Preparing spawn area: ") {
            self.on_preparing(rest);
        }

        if message.starts_with("Done ")
            && let Some(elapsed) = parse_done_seconds(message)
        {
            self.on_done(message, elapsed);
        }

        if let Some(rest) = message.strip_prefix("Can't keep up! Is the server overloaded? Running ")
        {
            match leading_number(rest) {
                Some(ms) => self.bus.publish(ServerEvent::Lag(ms)),
                None => warn!(%message, "Unparseable lag warning"),
            }
        }

        if let Some(mode) = message.strip_prefix("Default game type: ") {
            self.state
                .update(|s| s.default_game_mode = Some(mode.to_string()));
            self.bus.publish(ServerEvent::GameMode(mode.to_string()));
        }

        if line.thread.starts_with(&self.authenticator_prefix)
            && let Some(rest) = message.strip_prefix("UUID of player ")
            && let Some((name, uuid)) = rest.split_once(" is ")
        {
            debug!(%name, %uuid, "Pending login");
            self.pending_logins.insert(
                name.to_string(),
                PendingPlayerLogin {
                    name: name.to_string(),
                    uuid: uuid.to_string(),
                },
            );
        }

        if line.is_thread(&self.main_thread) && message.contains("logged in with entity id") {
            self.on_login(message);
        }

        if line.is_thread(&self.main_thread)
            && let Some(name) = message.strip_suffix(" joined the game")
        {
            let session = self.state.snapshot().player(name).cloned();
            match session {
                Some(session) => {
                    info!(player = %name, "Player joined");
                    self.bus.publish(ServerEvent::Join(session));
                }
                None => debug!(player = %name, "Join for player without a session"),
            }
        }

        let fatal = match message {
            EULA_MESSAGE => Some(FatalCondition::EulaNotAccepted),
            STARTUP_FAILED_MESSAGE => Some(FatalCondition::StartupFailed),
            _ => None,
        };

        self.publish_generic(line);

        match fatal {
            Some(condition) => {
                error!(%condition, "Fatal condition in server log");
                Err(condition)
            }
            None => Ok(()),
        }
    }

    fn publish_generic(&mut self, line: &LogLine) {
        let previous = match (&mut self.history, &line.level) {
            (Some(history), LogLevel::Info) => history.push(&line.message),
            (Some(history), _) => history.current.clone(),
            (None, _) => None,
        };
        self.bus
            .publish(ServerEvent::Log(LogEvent::from_line(line, previous)));
    }

    fn on_listen(&self, address: &str) {
        self.bus.publish(ServerEvent::Listen(address.to_string()));

        let Some((ip, port)) = address.rsplit_once(':') else {
            warn!(%address, "Listen address without a port");
            return;
        };
        self.state.update(|s| s.ip = Some(ip.to_string()));
        self.bus.publish(ServerEvent::Ip(ip.to_string()));

        match port.parse::<u16>() {
            Ok(port) => {
                self.state.update(|s| s.port = Some(port));
                self.bus.publish(ServerEvent::Port(port));
            }
            Err(e) => warn!(%address, error = %e, "Unparseable listen port"),
        }
    }

    fn on_preparing(&mut self, rest: &str) {
        let Some(pct) = rest
            .trim()
            .trim_end_matches('%')
            .parse::<u8>()
            .ok()
            .filter(|p| *p <= 100)
        else {
            warn!(progress = %rest, "Unparseable spawn progress");
            return;
        };
        // Progress only moves forward while preparing.
        let progress = self.state.update(|s| {
            s.prepare_percentage = s.prepare_percentage.max(pct);
            s.prepare_percentage
        });
        if self.announced_progress == Some(progress) {
            return;
        }
        self.announced_progress = Some(progress);
        self.bus.publish(ServerEvent::Preparing(progress));
    }

    fn on_done(&mut self, message: &str, elapsed: f64) {
        let already_ready = self.state.update(|s| std::mem::replace(&mut s.ready, true));
        if already_ready {
            debug!(%message, "Ignoring repeated Done line");
            return;
        }

        info!(elapsed_secs = elapsed, "Server ready");
        self.history = Some(MessageHistory::default());
        self.bus.publish(ServerEvent::Ready(elapsed));
    }

    fn on_login(&mut self, message: &str) {
        let name = message.split('[').next().unwrap_or(message);
        if !self.pending_logins.contains_key(name) {
            debug!(player = %name, "Login line without a pending login");
            return;
        }

        let Some(details) = parse_login(message) else {
            warn!(%message, "Unparseable login line, login stays pending");
            return;
        };
        let Some(pending) = self.pending_logins.remove(name) else {
            return;
        };

        let session = PlayerSession::promote(
            pending,
            details.ip,
            details.port,
            details.entity_id,
            details.coordinates,
        );
        info!(player = %session.name, entity_id = session.entity_id, "Player logged in");
        self.state.update(|s| s.players.push(session));
    }

    /// Current state, for tests and diagnostics.
    pub fn snapshot(&self) -> ServerState {
        self.state.snapshot()
    }
}

fn parse_environment(pairs: &str) -> BTreeMap<String, String> {
    pairs
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(key, value)| (key.trim().replace('\'', ""), value.trim().replace('\'', "")))
        .collect()
}

/// `Done (6.123s)! For help, type "help"` -> 6.123
fn parse_done_seconds(message: &str) -> Option<f64> {
    let (_, rest) = message.split_once('(')?;
    let (secs, _) = rest.split_once("s)")?;
    secs.trim().parse().ok()
}

fn leading_number(text: &str) -> Option<u64> {
    let end = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    text[..end].parse().ok()
}

struct LoginDetails {
    ip: String,
    port: u16,
    entity_id: i64,
    coordinates: Coordinates,
}

/// `Steve[/127.0.0.1:54321] logged in with entity id 5 at (10.0, 64.0, 10.0)`
fn parse_login(message: &str) -> Option<LoginDetails> {
    let (_, rest) = message.split_once('[')?;
    let (address, rest) = rest.split_once(']')?;
    let address = address.strip_prefix('/').unwrap_or(address);
    let (ip, port) = address.rsplit_once(':')?;

    let rest = rest.trim_start().strip_prefix("logged in with entity id ")?;
    let (entity_id, rest) = rest.split_once(" at ")?;
    let coords = rest.trim().strip_prefix('(')?.strip_suffix(')')?;
    let mut axes = coords.split(',').map(|v| v.trim().parse::<f64>());
    let (Some(Ok(x)), Some(Ok(y)), Some(Ok(z)), None) =
        (axes.next(), axes.next(), axes.next(), axes.next())
    else {
        return None;
    };

    Some(LoginDetails {
        ip: ip.to_string(),
        port: port.parse().ok()?,
        entity_id: entity_id.trim().parse().ok()?,
        coordinates: Coordinates::new(x, y, z),
    })
}
