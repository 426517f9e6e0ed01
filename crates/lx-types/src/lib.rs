//! Shared types for lx
//!
//! This crate contains the normalized log entry that flows through every
//! stage of the pipeline, its JSON-lines wire shape, and the entry pool.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt;

mod json;
mod pool;

pub use json::{EntryError, JsonRecord};
pub use pool::EntryPool;

// ============================================================================
// Log Level
// ============================================================================

/// Log severity level
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum LogLevel {
    #[default]
    Unknown,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// All known levels, lowest severity first
    pub const KNOWN: [LogLevel; 5] = [
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
    ];

    /// Parse log level from common spellings (case-insensitive)
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "debug" | "dbg" | "trace" => Self::Debug,
            "info" | "inf" | "information" => Self::Info,
            "warn" | "warning" | "wrn" => Self::Warn,
            "error" | "err" => Self::Error,
            "fatal" | "panic" | "critical" | "crit" => Self::Fatal,
            _ => Self::Unknown,
        }
    }

    /// Upper-case display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }

    /// Numeric severity for minimum-level comparisons (unknown is lowest)
    pub fn severity(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Debug => 1,
            Self::Info => 2,
            Self::Warn => 3,
            Self::Error => 4,
            Self::Fatal => 5,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Stream Kind
// ============================================================================

/// Which physical input an entry was read from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum StreamKind {
    /// Primary output of a spawned process
    #[default]
    Stdout,
    /// Secondary output of a spawned process
    Stderr,
    File,
    Stdin,
    /// Log stream of a container runtime
    Container,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::File => "file",
            Self::Stdin => "stdin",
            Self::Container => "container",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stdout" => Some(Self::Stdout),
            "stderr" => Some(Self::Stderr),
            "file" => Some(Self::File),
            "stdin" => Some(Self::Stdin),
            "container" => Some(Self::Container),
            _ => None,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Log Entry
// ============================================================================

/// A single normalized log entry
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogEntry {
    /// Capture time (or the timestamp parsed from the line)
    pub timestamp: DateTime<Utc>,

    /// Physical stream the line came from
    pub stream: StreamKind,

    /// Severity, `Unknown` until set by the source or detected
    pub level: LogLevel,

    /// Human-readable origin, e.g. `file:/var/log/app.log`
    pub source: String,

    /// Line text without the trailing newline
    pub message: String,

    /// Extracted structured fields (empty = none)
    pub fields: BTreeMap<String, String>,

    /// Original line bytes (empty = not preserved)
    pub raw: Vec<u8>,

    /// Per-source sequence number, starting at 1
    pub seq: u64,
}

impl LogEntry {
    /// Create an entry stamped with the current time
    pub fn new(stream: StreamKind, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            source: source.into(),
            message: message.into(),
            ..Self::default()
        }
    }

    /// Pre-size the owned buffers for reuse through a pool
    pub fn with_capacity(message: usize, raw: usize) -> Self {
        Self {
            message: String::with_capacity(message),
            raw: Vec::with_capacity(raw),
            ..Self::default()
        }
    }

    /// Reset every mutable field while keeping allocated capacity.
    ///
    /// After a reset the entry has an empty message, source, field map and raw
    /// span, an unknown level, sequence 0, the `stdout` stream tag and the Unix
    /// epoch as timestamp.
    pub fn reset(&mut self) {
        self.timestamp = DateTime::UNIX_EPOCH;
        self.stream = StreamKind::default();
        self.level = LogLevel::Unknown;
        self.source.clear();
        self.message.clear();
        self.fields.clear();
        self.raw.clear();
        self.seq = 0;
    }

    /// Fill in the level from the message if it is still unknown.
    ///
    /// Running this twice is harmless: a known level is never replaced.
    pub fn ensure_level(&mut self, detect: impl FnOnce(&str) -> LogLevel) -> LogLevel {
        if self.level == LogLevel::Unknown {
            self.level = detect(&self.message);
        }
        self.level
    }

    /// Get a field value by name
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Whether the original bytes were preserved
    pub fn has_raw(&self) -> bool {
        !self.raw.is_empty()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ts = self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        if self.level == LogLevel::Unknown {
            write!(f, "[{}][{}]: {}", ts, self.stream, self.message)
        } else {
            write!(f, "[{}][{}][{}]: {}", ts, self.stream, self.level, self.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_level_parse_aliases() {
        assert_eq!(LogLevel::parse("ERR"), LogLevel::Error);
        assert_eq!(LogLevel::parse("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("Panic"), LogLevel::Fatal);
        assert_eq!(LogLevel::parse("CRITICAL"), LogLevel::Fatal);
        assert_eq!(LogLevel::parse(" info "), LogLevel::Info);
        assert_eq!(LogLevel::parse("verbose"), LogLevel::Unknown);
    }

    #[test]
    fn test_level_severity_order() {
        assert!(LogLevel::Fatal.severity() > LogLevel::Error.severity());
        assert!(LogLevel::Debug.severity() > LogLevel::Unknown.severity());
    }

    #[test]
    fn test_stream_round_trips_through_str() {
        for stream in [
            StreamKind::Stdout,
            StreamKind::Stderr,
            StreamKind::File,
            StreamKind::Stdin,
            StreamKind::Container,
        ] {
            assert_eq!(StreamKind::parse(stream.as_str()), Some(stream));
        }
        assert_eq!(StreamKind::parse("docker"), None);
    }

    #[test]
    fn test_ensure_level_runs_once() {
        let mut entry = LogEntry::new(StreamKind::Stdin, "stdin", "boom");
        let mut calls = 0;
        entry.ensure_level(|_| {
            calls += 1;
            LogLevel::Error
        });
        entry.ensure_level(|_| {
            calls += 1;
            LogLevel::Info
        });
        assert_eq!(calls, 1);
        assert_eq!(entry.level, LogLevel::Error);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut entry = LogEntry::new(StreamKind::Stderr, "exec:app", "hello");
        entry.level = LogLevel::Warn;
        entry.seq = 9;
        entry.raw.extend_from_slice(b"hello");
        entry.fields.insert("k".into(), "v".into());

        entry.reset();

        assert!(entry.message.is_empty());
        assert!(entry.source.is_empty());
        assert!(entry.fields.is_empty());
        assert!(!entry.has_raw());
        assert_eq!(entry.level, LogLevel::Unknown);
        assert_eq!(entry.seq, 0);
        assert_eq!(entry.stream, StreamKind::Stdout);
        assert_eq!(entry.timestamp, DateTime::UNIX_EPOCH);
    }

    #[test]
    fn test_display_format() {
        let mut entry = LogEntry::new(StreamKind::Stdout, "exec:app", "disk full");
        entry.timestamp = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(entry.to_string(), "[2024-01-15T10:30:00Z][stdout]: disk full");

        entry.level = LogLevel::Error;
        assert_eq!(
            entry.to_string(),
            "[2024-01-15T10:30:00Z][stdout][ERROR]: disk full"
        );
    }
}
