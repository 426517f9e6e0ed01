use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use lx_types::{LogEntry, LogLevel};

/// Level keywords in common formats like `[ERROR]`, `level=warn`, `INFO:`
static LEVEL_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(DEBUG|TRACE|INFO|WARN(?:ING)?|ERR(?:OR)?|FATAL|PANIC|CRITICAL)\b")
        .expect("level token regex is valid")
});

/// JSON members that may carry the level
const LEVEL_FIELDS: [&str; 6] = ["level", "lvl", "severity", "log.level", "loglevel", "log_level"];

/// Detect a log level from message text.
///
/// The first level keyword in the message wins.
pub fn detect_level(message: &str) -> LogLevel {
    LEVEL_TOKEN
        .find(message)
        .map(|m| LogLevel::parse(m.as_str()))
        .unwrap_or_default()
}

/// Merge the scalar members of a JSON object message into the entry fields.
///
/// A level member also sets the entry level when it is still unknown. Returns
/// false, leaving the entry untouched, when the message is not a JSON object.
pub fn extract_json_fields(entry: &mut LogEntry) -> bool {
    let trimmed = entry.message.trim();
    if !trimmed.starts_with('{') {
        return false;
    }
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) else {
        return false;
    };

    if entry.level == LogLevel::Unknown {
        entry.level = level_from_json(&obj);
    }

    for (key, value) in obj {
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            // Nested values and nulls are not flattened
            _ => continue,
        };
        entry.fields.insert(key, value);
    }
    true
}

fn level_from_json(obj: &Map<String, Value>) -> LogLevel {
    for field in LEVEL_FIELDS {
        match obj.get(field) {
            Some(Value::String(s)) => return LogLevel::parse(s),
            // Bunyan / pino numeric levels
            Some(Value::Number(n)) => {
                if let Some(num) = n.as_u64() {
                    return match num {
                        0..=20 => LogLevel::Debug,
                        21..=30 => LogLevel::Info,
                        31..=40 => LogLevel::Warn,
                        41..=50 => LogLevel::Error,
                        _ => LogLevel::Fatal,
                    };
                }
            }
            _ => {}
        }
    }
    LogLevel::Unknown
}
