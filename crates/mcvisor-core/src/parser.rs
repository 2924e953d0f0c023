//! Line splitting and column parsing for server output.
//!
//! Output arrives as arbitrary byte chunks. [`LineBuffer`] holds the
//! unterminated tail between chunks so the emitted line sequence is the
//! same no matter where the chunk boundaries fall. Splitting happens on raw
//! bytes and each complete line is decoded lossily, which keeps a multi-byte
//! character split across two chunks intact and never aborts on bad UTF-8.

use crate::domain::{LogLevel, LogLine};
use chrono::NaiveTime;

/// Incremental newline splitter.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in order.
    ///
    /// Line terminators (`\n`, optionally preceded by `\r`) are removed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let scan_from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut search = scan_from;
        while let Some(offset) = self.pending[search..].iter().position(|&b| b == b'\n') {
            let end = search + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
            search = start;
        }
        self.pending.drain(..start);
        lines
    }

    /// Append a chunk and parse every completed line.
    pub fn push_parsed(&mut self, chunk: &[u8]) -> Vec<LogLine> {
        self.push(chunk).iter().map(|l| parse_line(l)).collect()
    }

    /// Flush the unterminated remainder, if any. Used at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decompose `[HH:MM:SS] [thread/LEVEL]: message`.
///
/// Anything that does not fit the layout becomes an unstructured line
/// carrying the full text. A well-formed prefix with an unparseable time
/// keeps its thread and level but has no timestamp.
pub fn parse_line(text: &str) -> LogLine {
    try_parse(text).unwrap_or_else(|| LogLine::unstructured(text))
}

fn try_parse(text: &str) -> Option<LogLine> {
    let rest = text.strip_prefix('[')?;
    let (time, rest) = rest.split_once("] [")?;
    let (origin, message) = rest.split_once("]:")?;
    let (thread, level) = origin.rsplit_once('/')?;

    Some(LogLine {
        timestamp: NaiveTime::parse_from_str(time, "%H:%M:%S").ok(),
        thread: thread.to_string(),
        level: LogLevel::parse(level),
        message: message.strip_prefix(' ').unwrap_or(message).to_string(),
    })
}
