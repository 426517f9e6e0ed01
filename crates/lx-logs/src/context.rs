use std::collections::VecDeque;
use std::sync::Arc;

use lx_types::LogEntry;

use crate::filter::Filter;

/// Grep-style `-B` / `-A` context around filter matches.
///
/// Every entry goes into a history of the last `before + 1` entries before
/// the wrapped filter is checked. A match emits the buffered lines followed
/// by the match and re-arms the after counter. Each entry is emitted at most
/// once, so overlapping windows do not repeat lines.
pub struct ContextWindow {
    filter: Box<dyn Filter>,
    before: usize,
    after: usize,

    /// (position, entry) of the most recent entries
    history: VecDeque<(u64, Arc<LogEntry>)>,

    after_remaining: usize,

    /// Entries seen so far
    seen: u64,

    /// Position of the last emitted entry (0 = none)
    emitted_through: u64,
}

impl ContextWindow {
    pub fn new(filter: impl Filter + 'static, before: usize, after: usize) -> Self {
        let size = before + 1;
        Self {
            filter: Box::new(filter),
            before,
            after,
            history: VecDeque::with_capacity(size),
            after_remaining: 0,
            seen: 0,
            emitted_through: 0,
        }
    }

    /// Feed one entry, returning what should be emitted now (possibly nothing)
    pub fn process(&mut self, entry: &Arc<LogEntry>) -> Vec<Arc<LogEntry>> {
        self.seen += 1;
        let position = self.seen;

        if self.history.len() > self.before {
            self.history.pop_front();
        }
        self.history.push_back((position, Arc::clone(entry)));

        if self.filter.matches(entry) {
            let emitted = self
                .history
                .iter()
                .filter(|(pos, _)| *pos > self.emitted_through)
                .map(|(_, e)| Arc::clone(e))
                .collect();
            self.emitted_through = position;
            self.after_remaining = self.after;
            return emitted;
        }

        if self.after_remaining > 0 {
            self.after_remaining -= 1;
            self.emitted_through = position;
            return vec![Arc::clone(entry)];
        }

        Vec::new()
    }

    pub fn before(&self) -> usize {
        self.before
    }

    pub fn after(&self) -> usize {
        self.after
    }

    pub fn name(&self) -> String {
        format!("context(-B {} -A {}): {}", self.before, self.after, self.filter.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{ExcludeFilter, FilterChain, KeywordFilter, MatchMode};
    use lx_types::StreamKind;

    fn run(window: &mut ContextWindow, lines: &[&str]) -> Vec<String> {
        lines
            .iter()
            .map(|line| Arc::new(LogEntry::new(StreamKind::Stdout, "test", *line)))
            .flat_map(|entry| window.process(&entry))
            .map(|entry| entry.message.clone())
            .collect()
    }

    #[test]
    fn test_before_and_after() {
        let mut window = ContextWindow::new(KeywordFilter::new("*"), 1, 1);
        let out = run(&mut window, &["a", "b", "c*", "d", "e"]);
        assert_eq!(out, vec!["b", "c*", "d"]);
    }

    #[test]
    fn test_two_before_one_after() {
        let mut window = ContextWindow::new(KeywordFilter::new("*"), 2, 1);
        let out = run(&mut window, &["a", "b", "c*", "d", "e"]);
        assert_eq!(out, vec!["a", "b", "c*", "d"]);
    }

    #[test]
    fn test_before_window_bounds() {
        let mut window = ContextWindow::new(KeywordFilter::new("*"), 2, 1);
        let out = run(&mut window, &["a", "b", "c", "d*", "e", "f"]);
        assert_eq!(out, vec!["b", "c", "d*", "e"]);
    }

    #[test]
    fn test_before_limited_to_seen_lines() {
        let mut window = ContextWindow::new(KeywordFilter::new("*"), 3, 0);
        let out = run(&mut window, &["a", "b*", "c"]);
        assert_eq!(out, vec!["a", "b*"]);
    }

    #[test]
    fn test_zero_context_is_plain_filter() {
        let mut window = ContextWindow::new(KeywordFilter::new("*"), 0, 0);
        let out = run(&mut window, &["a", "b*", "c", "d*"]);
        assert_eq!(out, vec!["b*", "d*"]);
    }

    #[test]
    fn test_new_match_rearms_after_counter() {
        let mut window = ContextWindow::new(KeywordFilter::new("*"), 0, 2);
        let out = run(&mut window, &["a*", "b", "c*", "d", "e", "f"]);
        assert_eq!(out, vec!["a*", "b", "c*", "d", "e"]);
    }

    #[test]
    fn test_overlapping_windows_emit_once() {
        let mut window = ContextWindow::new(KeywordFilter::new("*"), 2, 1);
        let out = run(&mut window, &["a", "b*", "c", "d*", "e", "f"]);
        assert_eq!(out, vec!["a", "b*", "c", "d*", "e"]);
    }

    #[test]
    fn test_context_lines_skip_exclude_check() {
        let chain = FilterChain::new(MatchMode::All)
            .with(KeywordFilter::new("ERROR"))
            .with(ExcludeFilter::new(["healthcheck"]));
        let mut window = ContextWindow::new(chain, 1, 1);
        let out = run(
            &mut window,
            &["healthcheck ok", "ERROR disk full", "healthcheck ok", "ERROR healthcheck"],
        );
        assert_eq!(out, vec!["healthcheck ok", "ERROR disk full", "healthcheck ok"]);
    }
}
