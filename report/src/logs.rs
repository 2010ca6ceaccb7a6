//! Run log.
//!
//! Every message a run produces goes through a [`RunLog`]: it is forwarded
//! to `tracing` for display and kept in memory so callers can inspect what
//! happened (tests check warnings this way).

use serde::{Deserialize, Serialize};

/// Log level for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
}

/// A single log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Optional indentation level (for nested logs)
    #[serde(default)]
    pub indent: u8,
    /// Minimum `-v` count needed to display this entry
    #[serde(default)]
    pub verbose: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            indent: 0,
            verbose: 0,
        }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Message with its indentation.
    pub fn display(&self) -> String {
        format!("{}{}", "    ".repeat(self.indent as usize), self.message)
    }
}

/// Collects log entries for one run and forwards them to `tracing`.
#[derive(Debug, Default)]
pub struct RunLog {
    entries: Vec<LogEntry>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry and emit it.
    ///
    /// Info entries map to `info`, `debug` or `trace` depending on their
    /// verbosity; the binary sets the filter from `-v`.
    pub fn log(&mut self, entry: LogEntry) {
        let line = entry.display();
        match entry.level {
            LogLevel::Info | LogLevel::Success => match entry.verbose {
                0 => tracing::info!("{}", line),
                1 => tracing::debug!("{}", line),
                _ => tracing::trace!("{}", line),
            },
            LogLevel::Warning => tracing::warn!("{}", line),
        }
        self.entries.push(entry);
    }

    pub fn info(&mut self, msg: impl Into<String>, verbose: u8, indent: u8) {
        self.log(LogEntry::info(msg).with_verbose(verbose).with_indent(indent));
    }

    pub fn success(&mut self, msg: impl Into<String>) {
        self.log(LogEntry::success(msg));
    }

    pub fn warning(&mut self, msg: impl Into<String>, indent: u8) {
        self.log(LogEntry::warning(msg).with_indent(indent));
    }

    /// Message followed by the data it refers to.
    pub fn info_with_data(&mut self, msg: &str, data: impl std::fmt::Display, verbose: u8, indent: u8) {
        self.info(format!("{}: {}", msg, data), verbose, indent);
    }

    /// All entries so far.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Warning entries so far.
    pub fn warnings(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(|e| e.level == LogLevel::Warning)
    }

    /// Whether any entry's message contains `text`.
    pub fn contains(&self, text: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warnings_are_collected() {
        let mut log = RunLog::new();
        log.info("Creating table", 2, 0);
        log.warning("Query returned no results: totals", 1);
        log.success("Report complete");

        let warnings: Vec<_> = log.warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].indent, 1);
        assert!(log.contains("totals"));
        assert_eq!(log.entries().len(), 3);
    }

    #[test]
    fn test_display_indent() {
        let entry = LogEntry::info("nested").with_indent(2);
        assert_eq!(entry.display(), "        nested");
    }

    #[test]
    fn test_entry_serializes_lowercase_level() {
        let json = serde_json::to_string(&LogEntry::warning("x")).unwrap();
        assert!(json.contains("\"warning\""));
    }
}
