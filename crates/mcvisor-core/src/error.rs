//! Error taxonomy shared by the core and its adapters.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the supervised process itself.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("Failed to spawn '{program}': {reason}")]
    Spawn { program: PathBuf, reason: String },

    /// The configured working directory does not exist or is not a directory.
    #[error("Invalid working directory: {0}")]
    InvalidWorkingDir(PathBuf),

    /// The process has already exited.
    #[error("Process is not running")]
    NotRunning,

    /// Reading from or writing to the process failed.
    #[error("Process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Unrecoverable conditions reported by the server in its own log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FatalCondition {
    #[error("The server EULA has not been accepted (see eula.txt)")]
    EulaNotAccepted,

    #[error("The server reported that it failed to start")]
    StartupFailed,
}

/// Errors that reject a single command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The server has not logged `Done` yet.
    #[error("Server is not ready to accept commands")]
    NotReady,

    /// The probe found nothing stored: the command does not exist or did not parse.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Command text contains a line break and would desynchronize replies.
    #[error("Command must be a single line: {0:?}")]
    Malformed(String),

    #[error("No reply to '{0}' before the timeout")]
    Timeout(String),

    #[error("Command '{0}' was cancelled")]
    Cancelled(String),

    /// The output stream ended before a reply arrived.
    #[error("Server exited before replying to '{0}'")]
    ProcessExited(String),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_command() {
        let err = CommandError::InvalidCommand("e".into());
        assert_eq!(err.to_string(), "Invalid command: e");
        let err = CommandError::Timeout("list".into());
        assert!(err.to_string().contains("'list'"));
    }

    #[test]
    fn test_process_error_converts() {
        let err: CommandError = ProcessError::NotRunning.into();
        assert!(matches!(err, CommandError::Process(ProcessError::NotRunning)));
    }
}
