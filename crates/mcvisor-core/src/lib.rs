//! Core domain for supervising a Minecraft-style server process.
//!
//! Pure logic only: log line parsing, state tracking, event publication,
//! the command sink port and the error taxonomy. Process handling lives in
//! `mcvisor-runtime`.
//!
//! Data flows one way: raw output chunks -> [`LineBuffer`] -> [`StateTracker`]
//! -> [`EventBus`] -> subscribers (including the command correlator).

pub mod domain;
pub mod error;
pub mod events;
pub mod parser;
pub mod ports;
pub mod settings;
pub mod tracker;

// Re-export commonly used types for convenience
pub use domain::{
    Coordinates, LogLevel, LogLine, PendingPlayerLogin, PlayerSession, ServerState, StateHandle,
};
pub use error::{CommandError, FatalCondition, ProcessError};
pub use events::{EventBus, LogEvent, ServerEvent, Subscription, Topic};
pub use parser::{LineBuffer, parse_line};
pub use ports::{CommandSink, LaunchConfig};
pub use settings::{
    DEFAULT_COMMAND_TIMEOUT_SECS, DEFAULT_PROBE_PATH, DEFAULT_PROBE_STORAGE, SettingsError,
    SupervisorSettings, validate_settings,
};
pub use tracker::StateTracker;
