//! Probe cell commands and readback recognition.
//!
//! Most console commands report failure only as free text. A probed command
//! is wrapped in `execute store success` so the server writes 1 or 0 into a
//! storage slot, which is then read back. If the wrapper itself fails to
//! parse nothing is stored and the readback reports a missing element.

/// Outcome reported by a readback line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readback {
    /// The stored success flag.
    Stored(bool),
    /// Nothing was stored: the wrapped command did not parse.
    Missing,
}

/// The storage slot used to smuggle a success flag out of a command.
#[derive(Debug, Clone)]
pub(crate) struct ProbeCell {
    storage: String,
    path: String,
}

impl ProbeCell {
    pub(crate) fn new(storage: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            storage: storage.into(),
            path: path.into(),
        }
    }

    pub(crate) fn reset_command(&self) -> String {
        format!("data remove storage {} {}", self.storage, self.path)
    }

    pub(crate) fn wrap(&self, command: &str) -> String {
        let command = command.trim().trim_start_matches('/');
        format!(
            "execute store success storage {} {} int 1 run {command}",
            self.storage, self.path
        )
    }

    pub(crate) fn read_command(&self) -> String {
        format!("data get storage {} {}", self.storage, self.path)
    }

    /// Whether `message` is the server's reply to the reset command.
    pub(crate) fn is_reset_ack(&self, message: &str) -> bool {
        message == format!("Modified storage {}", self.storage)
            || self.is_missing(message)
            || message.starts_with("Nothing changed")
    }

    /// Recognize the reply to the read command.
    pub(crate) fn readback(&self, message: &str) -> Option<Readback> {
        if self.is_missing(message) {
            return Some(Readback::Missing);
        }
        let prefix = format!("Storage {} has the following contents: ", self.storage);
        let value = message.strip_prefix(&prefix)?.trim();
        // `execute store ... int` stores a plain int, printed without a suffix.
        match value.parse::<i64>().ok()? {
            0 => Some(Readback::Stored(false)),
            _ => Some(Readback::Stored(true)),
        }
    }

    fn is_missing(&self, message: &str) -> bool {
        message
            .strip_prefix("Found no elements matching ")
            .is_some_and(|rest| rest.trim() == self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell() -> ProbeCell {
        ProbeCell::new("mcvisor:probe", "success")
    }

    #[test]
    fn test_command_text() {
        let cell = cell();
        assert_eq!(cell.reset_command(), "data remove storage mcvisor:probe success");
        assert_eq!(
            cell.wrap("/say hi"),
            "execute store success storage mcvisor:probe success int 1 run say hi"
        );
        assert_eq!(cell.read_command(), "data get storage mcvisor:probe success");
    }

    #[test]
    fn test_readback_decoding() {
        let cell = cell();
        assert_eq!(
            cell.readback("Storage mcvisor:probe has the following contents: 1"),
            Some(Readback::Stored(true))
        );
        assert_eq!(
            cell.readback("Storage mcvisor:probe has the following contents: 0"),
            Some(Readback::Stored(false))
        );
        assert_eq!(
            cell.readback("Found no elements matching success"),
            Some(Readback::Missing)
        );
        assert_eq!(cell.readback("Found no elements matching other"), None);
        assert_eq!(
            cell.readback("Storage other:cell has the following contents: 1"),
            None
        );
        assert_eq!(cell.readback("[Server] hi"), None);
    }

    #[test]
    fn test_reset_ack() {
        let cell = cell();
        assert!(cell.is_reset_ack("Modified storage mcvisor:probe"));
        assert!(cell.is_reset_ack("Found no elements matching success"));
        assert!(!cell.is_reset_ack("[Server] hi"));
    }
}
