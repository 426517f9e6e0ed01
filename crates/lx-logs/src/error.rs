//! Error types for log processing.

use lx_source::SourceError;
use thiserror::Error;

/// Errors raised while building or running a pipeline.
///
/// Everything except [`LogError::Sink`] is a construction or start-up
/// failure reported before the first entry is processed.
#[derive(Debug, Error)]
pub enum LogError {
    /// A grok token referenced a name missing from the builtin table.
    #[error("unknown grok pattern: {0}")]
    UnknownPattern(String),

    /// A filter or compiled grok expression is not a valid regex.
    #[error("invalid regex {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },

    /// An alert rule pattern is not a valid regex.
    #[error("invalid alert pattern {pattern:?}: {source}")]
    InvalidAlertPattern {
        pattern: String,
        source: regex::Error,
    },

    /// The pipeline was built without a source.
    #[error("pipeline: source is required")]
    MissingSource,

    /// The pipeline was built without a sink or event channel.
    #[error("pipeline: at least one sink or event channel is required")]
    MissingConsumer,

    /// `run` was called on a pipeline that already ran.
    #[error("pipeline: already run")]
    AlreadyRun,

    /// The source failed to start.
    #[error("pipeline: start source: {0}")]
    Source(#[from] SourceError),

    /// A sink failed to write, flush or close.
    #[error("pipeline: {operation} {sink}: {source}")]
    Sink {
        sink: String,
        operation: &'static str,
        source: std::io::Error,
    },
}

/// Result type alias for log processing operations.
pub type Result<T> = std::result::Result<T, LogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = LogError::UnknownPattern("HOSTNAME".into());
        assert_eq!(err.to_string(), "unknown grok pattern: HOSTNAME");

        let err = LogError::MissingSource;
        assert_eq!(err.to_string(), "pipeline: source is required");
        assert_eq!(LogError::AlreadyRun.to_string(), "pipeline: already run");

        let err = LogError::Sink {
            sink: "file:/tmp/out.log".into(),
            operation: "flush",
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(err.to_string(), "pipeline: flush file:/tmp/out.log: disk full");
    }

    #[test]
    fn test_invalid_regex_names_pattern() {
        let source = regex::Regex::new("(unclosed").unwrap_err();
        let err = LogError::InvalidAlertPattern {
            pattern: "(unclosed".into(),
            source,
        };
        assert!(err.to_string().contains("\"(unclosed\""));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LogError>();
    }
}
