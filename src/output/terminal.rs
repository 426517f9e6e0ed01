use std::io::{self, LineWriter, Stdout, Write};

use chrono::SecondsFormat;

use lx_logs::Sink;
use lx_types::{LogEntry, LogLevel};

const RESET: &str = "\x1b[0m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const GRAY: &str = "\x1b[90m";
const BOLD: &str = "\x1b[1m";

/// Human readable lines, optionally coloured by level
pub struct TerminalSink<W: Write + Send = Stdout> {
    out: LineWriter<W>,
    color: bool,
}

impl TerminalSink {
    pub fn stdout(color: bool) -> Self {
        Self::new(io::stdout(), color)
    }
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(writer: W, color: bool) -> Self {
        Self {
            out: LineWriter::new(writer),
            color,
        }
    }
}

impl<W: Write + Send> Sink for TerminalSink<W> {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()> {
        if !self.color {
            return writeln!(self.out, "{entry}");
        }

        let ts = entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        if entry.level == LogLevel::Unknown {
            writeln!(
                self.out,
                "{GRAY}[{ts}]{RESET}[{}]: {}",
                entry.stream, entry.message
            )
        } else {
            writeln!(
                self.out,
                "{GRAY}[{ts}]{RESET}[{}]{}[{}]{RESET}: {}",
                entry.stream,
                level_color(entry.level),
                entry.level,
                entry.message
            )
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    fn name(&self) -> String {
        "terminal".to_string()
    }
}

fn level_color(level: LogLevel) -> String {
    match level {
        LogLevel::Error | LogLevel::Fatal => format!("{BOLD}{RED}"),
        LogLevel::Warn => YELLOW.to_string(),
        LogLevel::Debug => GRAY.to_string(),
        _ => CYAN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use lx_types::StreamKind;

    fn entry(level: LogLevel) -> LogEntry {
        let mut entry = LogEntry::new(StreamKind::Stdout, "exec:app", "hello");
        entry.timestamp = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        entry.level = level;
        entry
    }

    fn output(sink: &TerminalSink<Vec<u8>>) -> String {
        String::from_utf8(sink.out.get_ref().clone()).unwrap()
    }

    #[test]
    fn test_plain_output() {
        let mut sink = TerminalSink::new(Vec::new(), false);
        sink.write(&entry(LogLevel::Unknown)).unwrap();
        sink.write(&entry(LogLevel::Warn)).unwrap();
        sink.flush().unwrap();

        assert_eq!(
            output(&sink),
            "[2024-01-15T10:30:00Z][stdout]: hello\n[2024-01-15T10:30:00Z][stdout][WARN]: hello\n"
        );
    }

    #[test]
    fn test_colored_output() {
        let mut sink = TerminalSink::new(Vec::new(), true);
        sink.write(&entry(LogLevel::Error)).unwrap();
        sink.close().unwrap();

        let out = output(&sink);
        assert!(out.starts_with("\x1b[90m[2024-01-15T10:30:00Z]\x1b[0m[stdout]"));
        assert!(out.contains("\x1b[1m\x1b[31m[ERROR]\x1b[0m: hello"));
    }

    #[test]
    fn test_level_colors() {
        assert_eq!(level_color(LogLevel::Fatal), "\x1b[1m\x1b[31m");
        assert_eq!(level_color(LogLevel::Warn), YELLOW);
        assert_eq!(level_color(LogLevel::Info), CYAN);
    }
}
