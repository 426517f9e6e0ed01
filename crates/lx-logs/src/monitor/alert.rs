use regex::Regex;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use lx_types::LogEntry;

use crate::error::{LogError, Result};

/// Named pattern with a hit counter
#[derive(Debug)]
pub struct AlertRule {
    name: String,
    regex: Regex,
    hits: AtomicU64,
}

impl AlertRule {
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|source| LogError::InvalidAlertPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            name: name.into(),
            regex,
            hits: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

/// Checks entries against alert rules.
///
/// Hit counters only grow for the life of the engine.
#[derive(Debug, Default)]
pub struct AlertEngine {
    rules: Vec<AlertRule>,
}

impl AlertEngine {
    /// One rule per pattern, named after the pattern
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        Self::from_rules(patterns.iter().map(|p| (p.as_ref(), p.as_ref())))
    }

    /// Rules from (name, pattern) pairs
    pub fn from_rules<'a>(rules: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self> {
        let rules = rules
            .into_iter()
            .map(|(name, pattern)| AlertRule::new(name, pattern))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Names of the rules matching the entry message
    pub fn check(&self, entry: &LogEntry) -> Vec<String> {
        self.rules
            .iter()
            .filter(|rule| rule.regex.is_match(&entry.message))
            .map(|rule| {
                rule.hits.fetch_add(1, Ordering::Relaxed);
                rule.name.clone()
            })
            .collect()
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// (name, hits) per rule
    pub fn hits(&self) -> Vec<(String, u64)> {
        self.rules
            .iter()
            .map(|rule| (rule.name.clone(), rule.hits()))
            .collect()
    }

    pub fn total_alerts(&self) -> u64 {
        self.rules.iter().map(AlertRule::hits).sum()
    }

    /// Hit report, empty when there are no rules
    pub fn summary(&self) -> String {
        if self.rules.is_empty() {
            return String::new();
        }
        let mut out = String::from("── Alerts ──\n");
        for rule in &self.rules {
            let _ = writeln!(out, "  {:<30} {} hits", rule.name, rule.hits());
        }
        out.push_str("────────────");
        out
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
    fn test_check_counts_hits() {
        let engine = AlertEngine::new(&["OOM", r"status=5\d\d"]).unwrap();

        assert_eq!(engine.check(&entry("killed: OOM status=503")), vec!["OOM", r"status=5\d\d"]);
        assert_eq!(engine.check(&entry("status=502")), vec![r"status=5\d\d"]);
        assert!(engine.check(&entry("status=200")).is_empty());

        assert_eq!(
            engine.hits(),
            vec![("OOM".to_string(), 1), (r"status=5\d\d".to_string(), 2)]
        );
        assert_eq!(engine.total_alerts(), 3);
    }

    #[test]
    fn test_named_rules() {
        let engine = AlertEngine::from_rules([("oom", "(?i)out of memory")]).unwrap();
        assert_eq!(engine.check(&entry("Out Of Memory")), vec!["oom"]);
        assert_eq!(engine.rules()[0].pattern(), "(?i)out of memory");
    }

    #[test]
    fn test_invalid_pattern_named_in_error() {
        let err = AlertEngine::new(&["ok", "(bad"]).unwrap_err();
        assert!(matches!(err, LogError::InvalidAlertPattern { pattern, .. } if pattern == "(bad"));
    }

    #[test]
    fn test_summary() {
        let engine = AlertEngine::new(&["panic"]).unwrap();
        engine.check(&entry("panic: nil map"));

        let summary = engine.summary();
        assert!(summary.starts_with("── Alerts ──\n"));
        assert!(summary.contains(&format!("  {:<30} 1 hits", "panic")));
        assert!(summary.ends_with("────────────"));

        assert_eq!(AlertEngine::default().summary(), "");
    }
}
