use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;

use lx_types::{LogEntry, LogLevel};

use crate::error::{LogError, Result};
use crate::parser::detect_level;

/// Predicate over log entries
pub trait Filter: Send + Sync {
    /// Check if a log entry passes this filter
    fn matches(&self, entry: &LogEntry) -> bool;

    /// Human readable description
    fn name(&self) -> String;
}

/// Case-sensitive substring match on the message
#[derive(Clone, Debug)]
pub struct KeywordFilter {
    keyword: String,
}

impl KeywordFilter {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
        }
    }
}

impl Filter for KeywordFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        entry.message.contains(&self.keyword)
    }

    fn name(&self) -> String {
        format!("keyword:{}", self.keyword)
    }
}

/// Regex match on the message, compiled up front
#[derive(Clone)]
pub struct RegexFilter {
    regex: Regex,

    /// Original pattern string
    pattern: String,

    case_insensitive: bool,
}

impl RegexFilter {
    pub fn new(pattern: &str) -> Result<Self> {
        Self::compile(pattern, false)
    }

    /// Create a case-insensitive filter
    pub fn new_case_insensitive(pattern: &str) -> Result<Self> {
        Self::compile(pattern, true)
    }

    fn compile(pattern: &str, case_insensitive: bool) -> Result<Self> {
        let source = if case_insensitive {
            format!("(?i){pattern}")
        } else {
            pattern.to_string()
        };
        let regex = Regex::new(&source).map_err(|source| LogError::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })?;

        Ok(Self {
            regex,
            pattern: pattern.to_string(),
            case_insensitive,
        })
    }

    /// Find all match positions in a string (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        self.regex
            .find_iter(text)
            .map(|m| (m.start(), m.end()))
            .collect()
    }

    /// Get the original pattern
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

impl Filter for RegexFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        self.regex.is_match(&entry.message)
    }

    fn name(&self) -> String {
        format!("regex:{}", self.pattern)
    }
}

impl fmt::Debug for RegexFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexFilter")
            .field("pattern", &self.pattern)
            .field("case_insensitive", &self.case_insensitive)
            .finish()
    }
}

/// Passes entries whose level is in an allowed set.
///
/// Entries that still carry an unknown level are judged by the level
/// detected from their message, without caching it on the entry. The
/// pipeline normalizes levels before filtering, so this only matters when
/// the filter is used on its own.
#[derive(Clone, Debug)]
pub struct LevelFilter {
    allowed: BTreeSet<LogLevel>,
}

impl LevelFilter {
    pub fn new(levels: impl IntoIterator<Item = LogLevel>) -> Self {
        Self {
            allowed: levels.into_iter().collect(),
        }
    }

    /// Allow `min` and every more severe level
    pub fn at_least(min: LogLevel) -> Self {
        Self::new(
            LogLevel::KNOWN
                .iter()
                .copied()
                .filter(|level| level.severity() >= min.severity()),
        )
    }
}

impl Filter for LevelFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        let level = match entry.level {
            LogLevel::Unknown => detect_level(&entry.message),
            level => level,
        };
        self.allowed.contains(&level)
    }

    fn name(&self) -> String {
        let levels: Vec<&str> = self.allowed.iter().map(|level| level.as_str()).collect();
        format!("level:{}", levels.join(","))
    }
}

/// Passes entries whose message contains none of the banned substrings
#[derive(Clone, Debug)]
pub struct ExcludeFilter {
    patterns: Vec<String>,
}

impl ExcludeFilter {
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

impl Filter for ExcludeFilter {
    fn matches(&self, entry: &LogEntry) -> bool {
        !self
            .patterns
            .iter()
            .any(|pattern| entry.message.contains(pattern.as_str()))
    }

    fn name(&self) -> String {
        format!("exclude:{}", self.patterns.join(","))
    }
}

/// How a chain combines its filters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchMode {
    /// Any filter passes (OR)
    #[default]
    Any,
    /// Every filter passes (AND)
    All,
}

impl MatchMode {
    /// Parse `or` / `any` and `and` / `all`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "or" | "any" => Some(MatchMode::Any),
            "and" | "all" => Some(MatchMode::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::Any => "OR",
            MatchMode::All => "AND",
        }
    }
}

/// Ordered filters combined by a [`MatchMode`].
///
/// An empty chain matches everything. Evaluation stops at the first filter
/// that decides the result.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
    mode: MatchMode,
}

impl FilterChain {
    pub fn new(mode: MatchMode) -> Self {
        Self {
            filters: Vec::new(),
            mode,
        }
    }

    /// Add a filter, builder style
    pub fn with(mut self, filter: impl Filter + 'static) -> Self {
        self.push(filter);
        self
    }

    pub fn push(&mut self, filter: impl Filter + 'static) {
        self.filters.push(Box::new(filter));
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Filter for FilterChain {
    fn matches(&self, entry: &LogEntry) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        match self.mode {
            MatchMode::Any => self.filters.iter().any(|f| f.matches(entry)),
            MatchMode::All => self.filters.iter().all(|f| f.matches(entry)),
        }
    }

    fn name(&self) -> String {
        let names: Vec<String> = self.filters.iter().map(|f| f.name()).collect();
        format!("chain({}: {})", self.mode.as_str(), names.join(", "))
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("mode", &self.mode)
            .field("filters", &self.filters.iter().map(|f| f.name()).collect::<Vec<_>>())
            .finish()
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
    fn test_keyword_filter_is_case_sensitive() {
        let filter = KeywordFilter::new("ERROR");
        assert!(filter.matches(&entry("an ERROR occurred")));
        assert!(!filter.matches(&entry("an error occurred")));
        assert_eq!(filter.name(), "keyword:ERROR");
    }

    #[test]
    fn test_regex_filter() {
        let filter = RegexFilter::new(r"timeout after \d+ms").unwrap();
        assert!(filter.matches(&entry("request timeout after 300ms")));
        assert!(!filter.matches(&entry("request finished")));
        assert_eq!(filter.pattern(), r"timeout after \d+ms");
    }

    #[test]
    fn test_invalid_regex_fails_at_construction() {
        let err = RegexFilter::new("(unclosed").unwrap_err();
        assert!(matches!(err, LogError::InvalidRegex { pattern, .. } if pattern == "(unclosed"));
    }

    #[test]
    fn test_case_insensitive_filter() {
        let filter = RegexFilter::new_case_insensitive("error").unwrap();
        assert!(filter.is_case_insensitive());
        assert!(filter.matches(&entry("ERROR: disk full")));
        assert_eq!(filter.find_matches("Error then error"), vec![(0, 5), (11, 16)]);
    }

    #[test]
    fn test_level_filter_detects_without_mutating() {
        let filter = LevelFilter::new([LogLevel::Error, LogLevel::Fatal]);
        let unknown = entry("ERROR connection refused");
        assert!(filter.matches(&unknown));
        assert_eq!(unknown.level, LogLevel::Unknown);

        let mut explicit = entry("ERROR in text but level says info");
        explicit.level = LogLevel::Info;
        assert!(!filter.matches(&explicit));
    }

    #[test]
    fn test_level_filter_at_least() {
        let filter = LevelFilter::at_least(LogLevel::Warn);
        assert_eq!(filter.name(), "level:WARN,ERROR,FATAL");
        assert!(filter.matches(&entry("WARN slow query")));
        assert!(filter.matches(&entry("FATAL out of memory")));
        assert!(!filter.matches(&entry("INFO started")));
        assert!(!filter.matches(&entry("no level here")));
    }

    #[test]
    fn test_exclude_filter() {
        let filter = ExcludeFilter::new(["healthcheck", "/metrics"]);
        assert!(filter.matches(&entry("GET /api/users")));
        assert!(!filter.matches(&entry("GET /metrics")));
        assert!(!filter.matches(&entry("healthcheck ok")));
    }

    #[test]
    fn test_empty_chain_matches_everything() {
        let chain = FilterChain::default();
        assert!(chain.is_empty());
        assert!(chain.matches(&entry("anything")));
    }

    #[test]
    fn test_chain_any_mode() {
        let chain = FilterChain::new(MatchMode::Any)
            .with(KeywordFilter::new("ERROR"))
            .with(KeywordFilter::new("WARN"));
        assert!(chain.matches(&entry("WARN low disk")));
        assert!(chain.matches(&entry("ERROR disk full")));
        assert!(!chain.matches(&entry("INFO ok")));
    }

    #[test]
    fn test_chain_all_mode_with_exclude() {
        let chain = FilterChain::new(MatchMode::All)
            .with(KeywordFilter::new("ERROR"))
            .with(ExcludeFilter::new(["healthcheck"]));
        assert!(!chain.matches(&entry("ERROR healthcheck failed")));
        assert!(chain.matches(&entry("ERROR disk full")));
    }

    #[test]
    fn test_nested_chain_gates_excludes() {
        let positive = FilterChain::new(MatchMode::Any)
            .with(KeywordFilter::new("ERROR"))
            .with(KeywordFilter::new("WARN"));
        let chain = FilterChain::new(MatchMode::All)
            .with(positive)
            .with(ExcludeFilter::new(["healthcheck"]));

        assert!(chain.matches(&entry("WARN slow")));
        assert!(!chain.matches(&entry("WARN healthcheck slow")));
        assert!(!chain.matches(&entry("DEBUG tick")));
        assert_eq!(chain.len(), 2);
        assert_eq!(
            chain.name(),
            "chain(AND: chain(OR: keyword:ERROR, keyword:WARN), exclude:healthcheck)"
        );
    }

    #[test]
    fn test_match_mode_parse() {
        assert_eq!(MatchMode::parse("AND"), Some(MatchMode::All));
        assert_eq!(MatchMode::parse("or"), Some(MatchMode::Any));
        assert_eq!(MatchMode::parse("xor"), None);
    }
}
