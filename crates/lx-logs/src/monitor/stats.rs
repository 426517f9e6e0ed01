use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use lx_types::LogLevel;

/// Counts per log level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub debug: u64,
    pub info: u64,
    pub warn: u64,
    pub error: u64,
    pub fatal: u64,
    pub unknown: u64,
}

impl LevelCounts {
    pub fn add(&mut self, level: LogLevel) {
        match level {
            LogLevel::Debug => self.debug += 1,
            LogLevel::Info => self.info += 1,
            LogLevel::Warn => self.warn += 1,
            LogLevel::Error => self.error += 1,
            LogLevel::Fatal => self.fatal += 1,
            LogLevel::Unknown => self.unknown += 1,
        }
    }

    pub fn get(&self, level: LogLevel) -> u64 {
        match level {
            LogLevel::Debug => self.debug,
            LogLevel::Info => self.info,
            LogLevel::Warn => self.warn,
            LogLevel::Error => self.error,
            LogLevel::Fatal => self.fatal,
            LogLevel::Unknown => self.unknown,
        }
    }

    pub fn total(&self) -> u64 {
        self.debug + self.info + self.warn + self.error + self.fatal + self.unknown
    }
}

/// Lock-free atomic counters for each log level
#[derive(Default)]
struct AtomicLevelCounts {
    debug: AtomicU64,
    info: AtomicU64,
    warn: AtomicU64,
    error: AtomicU64,
    fatal: AtomicU64,
    unknown: AtomicU64,
}

impl AtomicLevelCounts {
    fn slot(&self, level: LogLevel) -> &AtomicU64 {
        match level {
            LogLevel::Debug => &self.debug,
            LogLevel::Info => &self.info,
            LogLevel::Warn => &self.warn,
            LogLevel::Error => &self.error,
            LogLevel::Fatal => &self.fatal,
            LogLevel::Unknown => &self.unknown,
        }
    }

    fn increment(&self, level: LogLevel) {
        self.slot(level).fetch_add(1, Ordering::Relaxed);
    }

    fn to_counts(&self) -> LevelCounts {
        LevelCounts {
            debug: self.debug.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            warn: self.warn.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            fatal: self.fatal.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
        }
    }
}

/// Cumulative line counters for a run
pub struct Stats {
    total: AtomicU64,
    matched: AtomicU64,
    levels: AtomicLevelCounts,
    started: Instant,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            total: AtomicU64::new(0),
            matched: AtomicU64::new(0),
            levels: AtomicLevelCounts::default(),
            started: Instant::now(),
        }
    }

    /// Count a line read from the source
    pub fn record_line(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a line delivered to consumers
    pub fn record_match(&self, level: LogLevel) {
        self.matched.fetch_add(1, Ordering::Relaxed);
        self.levels.increment(level);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn matched(&self) -> u64 {
        self.matched.load(Ordering::Relaxed)
    }

    /// Matched lines per level
    pub fn level_counts(&self) -> LevelCounts {
        self.levels.to_counts()
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Lines per second since start
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.total() as f64 / secs
    }

    /// Percentage of lines that matched
    pub fn match_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.matched() as f64 / total as f64 * 100.0
    }

    pub fn summary(&self) -> String {
        let elapsed = Duration::from_millis(self.elapsed().as_millis() as u64);
        format!(
            "── Summary ──\n  Total lines:   {}\n  Matched lines: {} ({:.1}%)\n  Duration:      {:?}\n  Throughput:    {:.0} lines/s\n─────────────",
            self.total(),
            self.matched(),
            self.match_rate(),
            elapsed,
            self.rate(),
        )
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}
