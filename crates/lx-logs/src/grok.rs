use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

use lx_types::LogEntry;

use crate::error::{LogError, Result};

/// `%{NAME}` or `%{NAME:field}`
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%\{(\w+)(?::(\w+))?\}").expect("grok token regex is valid"));

/// Builtin patterns a token can reference
const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("IP", r"(?:\d{1,3}\.){3}\d{1,3}"),
    ("IPV6", r"[0-9A-Fa-f:]+"),
    ("WORD", r"\w+"),
    ("INT", r"[+-]?\d+"),
    ("NUMBER", r"[+-]?(?:\d+\.?\d*|\.\d+)"),
    ("NOTSPACE", r"\S+"),
    ("DATA", r".*?"),
    ("GREEDYDATA", r".*"),
    (
        "TIMESTAMP",
        r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
    ),
    (
        "LOGLEVEL",
        r"(?:DEBUG|INFO|WARN(?:ING)?|ERROR|ERR|FATAL|PANIC|CRITICAL|TRACE)",
    ),
    ("PATH", r"(?:/[\w.]+)+"),
    ("URI", r"\S+://\S+"),
    (
        "UUID",
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    ),
    ("MAC", r"(?:[0-9A-Fa-f]{2}:){5}[0-9A-Fa-f]{2}"),
    (
        "HTTPMETHOD",
        r"(?:GET|POST|PUT|DELETE|PATCH|HEAD|OPTIONS|CONNECT|TRACE)",
    ),
    ("STATUSCODE", r"\d{3}"),
    ("QS", r#""[^"]*""#),
];

fn builtin_pattern(name: &str) -> Option<&'static str> {
    BUILTIN_PATTERNS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, pattern)| *pattern)
}

/// Field extractor compiled from a grok pattern.
///
/// ```text
/// %{IP:client} %{WORD:method} %{NOTSPACE:path} %{STATUSCODE:status}
/// ```
///
/// Surrounding text is kept as regex. Each `%{NAME:field}` token becomes a
/// capture group with an internal name, and `%{NAME}` a non-capturing group.
#[derive(Clone, Debug)]
pub struct GrokParser {
    pattern: String,
    regex: Regex,

    /// (capture group, field name) in token order
    fields: Vec<(String, String)>,
}

impl GrokParser {
    pub fn new(pattern: &str) -> Result<Self> {
        let mut source = String::with_capacity(pattern.len() * 2);
        let mut fields = Vec::new();
        let mut last = 0;

        for caps in TOKEN.captures_iter(pattern) {
            let Some(token) = caps.get(0) else { continue };
            source.push_str(&pattern[last..token.start()]);
            last = token.end();

            let name = &caps[1];
            let sub = builtin_pattern(name)
                .ok_or_else(|| LogError::UnknownPattern(name.to_string()))?;

            match caps.get(2) {
                Some(field) => {
                    let group = format!("grok{}", fields.len());
                    let _ = write!(source, "(?P<{group}>{sub})");
                    fields.push((group, field.as_str().to_string()));
                }
                None => {
                    let _ = write!(source, "(?:{sub})");
                }
            }
        }
        source.push_str(&pattern[last..]);

        let regex = Regex::new(&source).map_err(|err| LogError::InvalidRegex {
            pattern: source.clone(),
            source: err,
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            fields,
        })
    }

    /// Merge captured fields into the entry.
    ///
    /// Returns false and leaves the entry untouched when the message does
    /// not match.
    pub fn apply(&self, entry: &mut LogEntry) -> bool {
        let Some(caps) = self.regex.captures(&entry.message) else {
            return false;
        };
        for (group, field) in &self.fields {
            if let Some(value) = caps.name(group) {
                entry.fields.insert(field.clone(), value.as_str().to_string());
            }
        }
        true
    }

    /// Get the original pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Field names in token order
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(_, field)| field.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lx_types::StreamKind;

    fn entry(message: &str) -> LogEntry {
        LogEntry::new(StreamKind::Stdout, "test", message)
    }

    #[test]
    fn test_named_fields() {
        let grok = GrokParser::new("%{IP:client} %{WORD:method}").unwrap();
        assert_eq!(grok.field_names(), vec!["client", "method"]);

        let mut matched = entry("10.0.0.1 GET");
        assert!(grok.apply(&mut matched));
        assert_eq!(matched.field("client"), Some("10.0.0.1"));
        assert_eq!(matched.field("method"), Some("GET"));
        assert_eq!(matched.fields.len(), 2);
    }

    #[test]
    fn test_no_match_leaves_entry_untouched() {
        let grok = GrokParser::new("%{IP:client} %{WORD:method}").unwrap();
        let mut unmatched = entry("not-an-ip GET");
        unmatched.fields.insert("existing".into(), "kept".into());
        let before = unmatched.clone();

        assert!(!grok.apply(&mut unmatched));
        assert_eq!(unmatched, before);
    }

    #[test]
    fn test_merge_keeps_unrelated_fields() {
        let grok = GrokParser::new("status=%{STATUSCODE:status}").unwrap();
        let mut e = entry("GET /health status=200");
        e.fields.insert("service".into(), "api".into());

        assert!(grok.apply(&mut e));
        assert_eq!(e.field("status"), Some("200"));
        assert_eq!(e.field("service"), Some("api"));
    }

    #[test]
    fn test_anonymous_tokens_do_not_capture() {
        let grok = GrokParser::new("%{TIMESTAMP} %{LOGLEVEL:level} %{GREEDYDATA:msg}").unwrap();
        assert_eq!(grok.field_names(), vec!["level", "msg"]);

        let mut e = entry("2024-01-15T10:30:00Z ERROR connection refused");
        assert!(grok.apply(&mut e));
        assert_eq!(e.field("level"), Some("ERROR"));
        assert_eq!(e.field("msg"), Some("connection refused"));
        assert_eq!(e.fields.len(), 2);
    }

    #[test]
    fn test_literal_groups_do_not_shift_fields() {
        let grok = GrokParser::new(r"(GET|POST) %{PATH:path} %{STATUSCODE:status}").unwrap();
        let mut e = entry("POST /api/v1/users 201");
        assert!(grok.apply(&mut e));
        assert_eq!(e.field("path"), Some("/api/v1/users"));
        assert_eq!(e.field("status"), Some("201"));
    }

    #[test]
    fn test_access_log() {
        let grok = GrokParser::new(
            r#"%{IP:client} %{HTTPMETHOD:method} %{NOTSPACE:path} %{STATUSCODE:status} %{QS:agent}"#,
        )
        .unwrap();
        let mut e = entry(r#"192.168.1.7 DELETE /items/42 404 "curl/8.5""#);
        assert!(grok.apply(&mut e));
        assert_eq!(e.field("method"), Some("DELETE"));
        assert_eq!(e.field("agent"), Some(r#""curl/8.5""#));
    }

    #[test]
    fn test_unknown_pattern() {
        let err = GrokParser::new("%{HOSTNAME:host}").unwrap_err();
        assert!(matches!(err, LogError::UnknownPattern(name) if name == "HOSTNAME"));
    }

    #[test]
    fn test_invalid_literal_regex() {
        let err = GrokParser::new("%{WORD:w} (unclosed").unwrap_err();
        assert!(matches!(err, LogError::InvalidRegex { .. }));
    }

    #[test]
    fn test_every_builtin_compiles() {
        for (name, _) in BUILTIN_PATTERNS {
            assert!(GrokParser::new(&format!("%{{{name}:f}}")).is_ok(), "{name}");
        }
    }
}
