//! Error types for log sources.

use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by [`Source::start`](crate::Source::start) before any
/// stream is returned.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The process could not be launched.
    #[error("failed to start {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// A child output pipe was not captured.
    #[error("{command}: {stream} pipe unavailable")]
    Pipe {
        command: String,
        stream: &'static str,
    },

    /// The file could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A one-shot source was started a second time.
    #[error("source {0} was already started")]
    AlreadyStarted(String),
}

/// Result type alias for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;
