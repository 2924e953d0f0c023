//! Command sink port for writing console commands.
//!
//! This port abstracts the destination of command text, keeping the
//! command correlator independent of how the process input is reached.

use async_trait::async_trait;

use crate::error::ProcessError;

/// Port for writing one console command to the server.
///
/// Implementations must write the whole line atomically with respect to
/// other callers, so concurrent commands never interleave mid-line.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Write `line` followed by a newline.
    ///
    /// # Arguments
    ///
    /// * `line` - Command text without the trailing newline
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::NotRunning` once the process has exited.
    async fn write_line(&self, line: &str) -> Result<(), ProcessError>;
}
