//! Process lifecycle signals.
//!
//! The supervisor publishes [`ProcessStatus`] through a watch channel. The
//! initial `Running` value is the `started` signal; `Exited` is sent exactly
//! once, by the task that reaps the child.

use serde::{Deserialize, Serialize};

/// Lifecycle status of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Spawned and not yet reaped.
    Running { pid: u32 },
    /// Reaped. `code` is `None` when the process died from a signal.
    Exited { code: Option<i32> },
}

impl ProcessStatus {
    pub const fn is_exited(&self) -> bool {
        matches!(self, Self::Exited { .. })
    }

    /// Exit code, if exited with one.
    pub const fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exited { code } => *code,
            Self::Running { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ProcessStatus::Running { pid: 42 }).unwrap();
        assert_eq!(json, r#"{"status":"running","pid":42}"#);
        let json = serde_json::to_string(&ProcessStatus::Exited { code: Some(0) }).unwrap();
        assert_eq!(json, r#"{"status":"exited","code":0}"#);
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(ProcessStatus::Running { pid: 1 }.exit_code(), None);
        assert!(ProcessStatus::Exited { code: Some(1) }.is_exited());
        assert_eq!(ProcessStatus::Exited { code: Some(1) }.exit_code(), Some(1));
    }
}
