//! Canonical event union for everything derived from the log stream.
//!
//! One variant per recognized fact plus [`ServerEvent::Log`], the generic
//! per-line event that every line produces regardless of whether any
//! pattern matched.
//!
//! # Wire Format
//!
//! Events serialize with a `type` tag:
//!
//! ```json
//! { "type": "port", "value": 25565 }
//! ```

mod bus;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::{LogLevel, LogLine, PlayerSession};

pub use bus::{EventBus, Subscription};

/// Payload of the generic per-line event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    pub thread: String,
    pub level: LogLevel,
    pub timestamp: Option<NaiveTime>,
    /// Generic message seen just before this one. Only tracked once the
    /// server is ready; `None` before that and for the first line after.
    pub previous: Option<String>,
}

impl LogEvent {
    pub fn from_line(line: &LogLine, previous: Option<String>) -> Self {
        Self {
            message: line.message.clone(),
            thread: line.thread.clone(),
            level: line.level.clone(),
            timestamp: line.timestamp,
            previous,
        }
    }
}

/// Everything the state tracker publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ServerEvent {
    /// `Environment:` key/value pairs, quotes stripped.
    Environment(BTreeMap<String, String>),
    Version(String),
    /// Full `ip:port` listen address.
    Listen(String),
    Ip(String),
    Port(u16),
    World(String),
    /// Spawn preparation progress in percent.
    Preparing(u8),
    /// Startup time reported by the `Done` line, in seconds.
    Ready(f64),
    /// Milliseconds behind reported by the overload warning.
    Lag(u64),
    #[serde(rename = "gamemode")]
    GameMode(String),
    Join(PlayerSession),
    Log(LogEvent),
}

impl ServerEvent {
    /// Channel this event is delivered on.
    pub fn topic(&self) -> Topic {
        match self {
            Self::Environment(_) => Topic::Environment,
            Self::Version(_) => Topic::Version,
            Self::Listen(_) => Topic::Listen,
            Self::Ip(_) => Topic::Ip,
            Self::Port(_) => Topic::Port,
            Self::World(_) => Topic::World,
            Self::Preparing(_) => Topic::Preparing,
            Self::Ready(_) => Topic::Ready,
            Self::Lag(_) => Topic::Lag,
            Self::GameMode(_) => Topic::GameMode,
            Self::Join(_) => Topic::Join,
            Self::Log(event) => Topic::Log(event.level.clone()),
        }
    }

    /// Generic payload, if this is a per-line event.
    pub fn as_log(&self) -> Option<&LogEvent> {
        match self {
            Self::Log(event) => Some(event),
            _ => None,
        }
    }
}

/// Named event channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Environment,
    Version,
    Listen,
    Ip,
    Port,
    World,
    Preparing,
    Ready,
    Lag,
    GameMode,
    Join,
    /// Generic per-line channel for one level.
    Log(LogLevel),
}

impl Topic {
    /// Channel name: the fact name, or the lowercased level for generic events.
    pub fn name(&self) -> &str {
        match self {
            Self::Environment => "environment",
            Self::Version => "version",
            Self::Listen => "listen",
            Self::Ip => "ip",
            Self::Port => "port",
            Self::World => "world",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::Lag => "lag",
            Self::GameMode => "gamemode",
            Self::Join => "join",
            Self::Log(level) => level.as_key(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
