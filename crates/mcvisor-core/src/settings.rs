//! Supervisor settings and validation.
//!
//! These are pure configuration types with no infrastructure dependencies.
//! Every field is optional so partial JSON documents deserialize cleanly;
//! the `effective_*` accessors apply the defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default time a command waits for its reply before failing.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Default storage id used as the probe cell.
pub const DEFAULT_PROBE_STORAGE: &str = "mcvisor:probe";

/// Default NBT path inside the probe storage.
pub const DEFAULT_PROBE_PATH: &str = "success";

/// Name of the thread that logs console command output and logins.
pub const DEFAULT_MAIN_THREAD: &str = "Server thread";

/// Prefix of the threads that log UUID assignment (`User Authenticator #1`).
pub const DEFAULT_AUTHENTICATOR_THREAD_PREFIX: &str = "User Authenticator";

/// Settings for one supervised server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SupervisorSettings {
    /// Seconds a command waits for its reply. `0` disables the timeout.
    pub command_timeout_secs: Option<u64>,

    /// Seconds `wait_ready` waits for the `Done` line. `None` waits forever.
    pub startup_timeout_secs: Option<u64>,

    /// Resource location of the storage used as the probe cell.
    pub probe_storage: Option<String>,

    /// NBT path written by probed commands.
    pub probe_path: Option<String>,

    /// Thread name that logs command replies and player logins.
    pub main_thread: Option<String>,

    /// Thread name prefix that logs player UUID assignment.
    pub authenticator_thread_prefix: Option<String>,
}

impl SupervisorSettings {
    /// Create settings with every default filled in.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            command_timeout_secs: Some(DEFAULT_COMMAND_TIMEOUT_SECS),
            startup_timeout_secs: None,
            probe_storage: Some(DEFAULT_PROBE_STORAGE.to_string()),
            probe_path: Some(DEFAULT_PROBE_PATH.to_string()),
            main_thread: Some(DEFAULT_MAIN_THREAD.to_string()),
            authenticator_thread_prefix: Some(DEFAULT_AUTHENTICATOR_THREAD_PREFIX.to_string()),
        }
    }

    /// Effective command timeout, `None` when disabled.
    #[must_use]
    pub fn effective_command_timeout(&self) -> Option<Duration> {
        match self.command_timeout_secs.unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Effective startup timeout, `None` when unset.
    #[must_use]
    pub fn effective_startup_timeout(&self) -> Option<Duration> {
        self.startup_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn effective_probe_storage(&self) -> &str {
        self.probe_storage.as_deref().unwrap_or(DEFAULT_PROBE_STORAGE)
    }

    #[must_use]
    pub fn effective_probe_path(&self) -> &str {
        self.probe_path.as_deref().unwrap_or(DEFAULT_PROBE_PATH)
    }

    #[must_use]
    pub fn effective_main_thread(&self) -> &str {
        self.main_thread.as_deref().unwrap_or(DEFAULT_MAIN_THREAD)
    }

    #[must_use]
    pub fn effective_authenticator_thread_prefix(&self) -> &str {
        self.authenticator_thread_prefix
            .as_deref()
            .unwrap_or(DEFAULT_AUTHENTICATOR_THREAD_PREFIX)
    }
}

/// Settings validation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SettingsError {
    #[error("Probe storage must be a namespaced id like 'ns:name', got '{0}'")]
    InvalidProbeStorage(String),

    #[error("Probe path cannot be empty or contain whitespace, got '{0}'")]
    InvalidProbePath(String),

    #[error("Thread name cannot be empty")]
    EmptyThreadName,

    #[error("Startup timeout must be at least 1 second")]
    InvalidStartupTimeout,
}

/// Validate settings values.
pub fn validate_settings(settings: &SupervisorSettings) -> Result<(), SettingsError> {
    if let Some(storage) = &settings.probe_storage {
        let valid = storage
            .split_once(':')
            .is_some_and(|(ns, name)| !ns.is_empty() && !name.is_empty())
            && !storage.contains(char::is_whitespace);
        if !valid {
            return Err(SettingsError::InvalidProbeStorage(storage.clone()));
        }
    }

    if let Some(path) = &settings.probe_path {
        if path.is_empty() || path.contains(char::is_whitespace) {
            return Err(SettingsError::InvalidProbePath(path.clone()));
        }
    }

    let thread_names = [&settings.main_thread, &settings.authenticator_thread_prefix];
    if thread_names
        .iter()
        .any(|name| name.as_ref().is_some_and(|n| n.trim().is_empty()))
    {
        return Err(SettingsError::EmptyThreadName);
    }

    if settings.startup_timeout_secs == Some(0) {
        return Err(SettingsError::InvalidStartupTimeout);
    }

    Ok(())
}
