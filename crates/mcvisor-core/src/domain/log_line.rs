//! Parsed server log lines.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity column of a log line (`INFO`, `WARN`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
    Fatal,
    /// Any other level name, stored lowercased. Empty for malformed lines.
    Other(String),
}

impl LogLevel {
    /// Parse a level column, case-insensitively.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "info" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            "debug" => Self::Debug,
            "fatal" => Self::Fatal,
            other => Self::Other(other.to_string()),
        }
    }

    /// Lowercased channel key used for the generic per-level event.
    pub fn as_key(&self) -> &str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Debug => "debug",
            Self::Fatal => "fatal",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

/// One line of server output, decomposed into its columns.
///
/// Lines that do not follow `[HH:MM:SS] [thread/LEVEL]: message` keep the
/// whole text in `message` with no timestamp and empty thread/level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Time of day; the server prints no date.
    pub timestamp: Option<NaiveTime>,
    pub thread: String,
    pub level: LogLevel,
    pub message: String,
}

impl LogLine {
    /// A line that could not be decomposed.
    pub fn unstructured(text: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            thread: String::new(),
            level: LogLevel::Other(String::new()),
            message: text.into(),
        }
    }

    /// Whether the line came from the given thread.
    pub fn is_thread(&self, name: &str) -> bool {
        self.thread == name
    }
}
