//! Output sinks for the lx binary.

mod file;
mod json;
mod terminal;

use std::io;

use clap::ValueEnum;
use serde::Deserialize;

use lx_types::LogEntry;

pub use file::FileSink;
pub use json::JsonSink;
pub use terminal::TerminalSink;

/// Line format for written entries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `[ts][stream][LEVEL]: message`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Render an entry as a single line, without the newline
pub fn render(entry: &LogEntry, format: OutputFormat) -> io::Result<String> {
    match format {
        OutputFormat::Text => Ok(entry.to_string()),
        OutputFormat::Json => entry.to_json_line().map_err(io::Error::other),
    }
}
