use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use lx_types::LogEntry;

use crate::filter::Filter;
use crate::monitor::LevelCounts;

/// Capacity used when zero is requested
const DEFAULT_CAPACITY: usize = 1024;

/// Thread-safe ring buffer for log entries.
///
/// One writer (the pipeline) and any number of readers share it through
/// clones of the handle.
#[derive(Clone)]
pub struct RingBuffer {
    /// Internal storage, oldest first
    entries: Arc<RwLock<VecDeque<Arc<LogEntry>>>>,

    /// Maximum capacity
    capacity: usize,

    /// Entries evicted so far
    dropped: Arc<AtomicU64>,
}

impl RingBuffer {
    /// Create a new ring buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Push a new entry, returning the oldest one if it was evicted
    pub fn push(&self, entry: Arc<LogEntry>) -> Option<Arc<LogEntry>> {
        let mut entries = self.entries.write();
        let evicted = if entries.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            entries.pop_front()
        } else {
            None
        };
        entries.push_back(entry);
        evicted
    }

    /// All entries in chronological order
    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        self.entries.read().iter().cloned().collect()
    }

    /// Get the last N entries
    pub fn tail(&self, n: usize) -> Vec<Arc<LogEntry>> {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(n);
        entries.iter().skip(start).cloned().collect()
    }

    /// Buffered entries passing the filter, oldest first
    pub fn search(&self, filter: &dyn Filter) -> Vec<Arc<LogEntry>> {
        self.entries
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// Get entry count per log level
    pub fn level_counts(&self) -> LevelCounts {
        let mut counts = LevelCounts::default();
        for entry in self.entries.read().iter() {
            counts.add(entry.level);
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries evicted since creation
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Clear all entries (the dropped count is kept)
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}
