use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::LogEntry;

/// Default number of idle entries kept for reuse
const DEFAULT_MAX_IDLE: usize = 1024;

/// Initial capacity of the message and raw buffers of a fresh entry
const ENTRY_BUFFER_CAPACITY: usize = 256;

/// Reuse pool for log entries.
///
/// Cloning the pool is cheap and every clone shares the same idle list, so one
/// pool can be handed to a source and to the pipeline that later releases the
/// entries it produced.
#[derive(Clone)]
pub struct EntryPool {
    idle: Arc<Mutex<Vec<LogEntry>>>,
    max_idle: usize,
    reused: Arc<AtomicU64>,
}

impl EntryPool {
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    /// Create a pool that keeps at most `max_idle` released entries
    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            idle: Arc::new(Mutex::new(Vec::with_capacity(max_idle.min(DEFAULT_MAX_IDLE)))),
            max_idle,
            reused: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Take an entry in the reset state (see [`LogEntry::reset`])
    pub fn acquire(&self) -> LogEntry {
        match self.idle.lock().pop() {
            Some(mut entry) => {
                entry.reset();
                self.reused.fetch_add(1, Ordering::Relaxed);
                entry
            }
            None => LogEntry::with_capacity(ENTRY_BUFFER_CAPACITY, ENTRY_BUFFER_CAPACITY),
        }
    }

    /// Return an entry for reuse; dropped if the pool is full
    pub fn release(&self, entry: LogEntry) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(entry);
        }
    }

    /// Number of entries currently waiting for reuse
    pub fn idle_len(&self) -> usize {
        self.idle.lock().len()
    }

    /// How many acquisitions were served from the idle list
    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }
}

impl Default for EntryPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogLevel, StreamKind};

    #[test]
    fn test_acquire_resets_released_entry() {
        let pool = EntryPool::new();
        let mut entry = pool.acquire();
        entry.stream = StreamKind::File;
        entry.level = LogLevel::Fatal;
        entry.message.push_str("old message");
        entry.raw.extend_from_slice(b"old message");
        entry.fields.insert("a".into(), "b".into());
        entry.seq = 42;
        pool.release(entry);

        let entry = pool.acquire();
        assert_eq!(pool.reused(), 1);
        assert!(entry.message.is_empty());
        assert!(entry.raw.is_empty());
        assert!(entry.raw.capacity() >= "old message".len());
        assert!(entry.fields.is_empty());
        assert_eq!(entry.level, LogLevel::Unknown);
        assert_eq!(entry.seq, 0);
        assert_eq!(entry.stream, StreamKind::Stdout);
    }

    #[test]
    fn test_release_respects_max_idle() {
        let pool = EntryPool::with_max_idle(2);
        for _ in 0..5 {
            pool.release(LogEntry::default());
        }
        assert_eq!(pool.idle_len(), 2);
    }

    #[test]
    fn test_clones_share_idle_list() {
        let pool = EntryPool::new();
        let other = pool.clone();
        other.release(LogEntry::default());
        assert_eq!(pool.idle_len(), 1);
        let _ = pool.acquire();
        assert_eq!(other.idle_len(), 0);
    }
}
