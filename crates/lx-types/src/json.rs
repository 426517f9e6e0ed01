//! JSON-lines wire shape for a serialized entry

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{LogEntry, LogLevel, StreamKind};

/// Errors decoding a JSON-lines record back into an entry
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("invalid json record: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[error("unknown stream {0:?}")]
    UnknownStream(String),
}

/// One JSON-lines object. Empty level, source and fields are omitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRecord {
    pub timestamp: String,
    pub stream: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl From<&LogEntry> for JsonRecord {
    fn from(entry: &LogEntry) -> Self {
        Self {
            timestamp: entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            stream: entry.stream.as_str().to_string(),
            level: (entry.level != LogLevel::Unknown).then(|| entry.level.as_str().to_string()),
            source: entry.source.clone(),
            message: entry.message.clone(),
            fields: entry.fields.clone(),
        }
    }
}

impl TryFrom<JsonRecord> for LogEntry {
    type Error = EntryError;

    fn try_from(record: JsonRecord) -> Result<Self, Self::Error> {
        let timestamp = DateTime::parse_from_rfc3339(&record.timestamp)
            .map_err(|source| EntryError::Timestamp {
                value: record.timestamp.clone(),
                source,
            })?
            .with_timezone(&Utc);
        let stream = StreamKind::parse(&record.stream)
            .ok_or_else(|| EntryError::UnknownStream(record.stream.clone()))?;

        Ok(LogEntry {
            timestamp,
            stream,
            level: record.level.as_deref().map(LogLevel::parse).unwrap_or_default(),
            source: record.source,
            message: record.message,
            fields: record.fields,
            ..LogEntry::default()
        })
    }
}

impl LogEntry {
    /// Serialize as a single JSON object (no trailing newline)
    pub fn to_json_line(&self) -> Result<String, EntryError> {
        Ok(serde_json::to_string(&JsonRecord::from(self))?)
    }

    /// Parse one JSON-lines object back into an entry.
    ///
    /// Raw bytes and the sequence number are not part of the wire shape.
    pub fn from_json_line(line: &str) -> Result<Self, EntryError> {
        let record: JsonRecord = serde_json::from_str(line)?;
        LogEntry::try_from(record)
    }
}
