use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

const DEFAULT_WINDOW: Duration = Duration::from_secs(10);
const DEFAULT_THRESHOLD: f64 = 3.0;

/// Fewest buckets needed before a spike can be declared
const MIN_BUCKETS: usize = 3;

/// Sliding-window event rate tracker with spike detection.
///
/// Events are counted in one-second buckets. A spike is the latest bucket
/// exceeding `threshold` times the average of the other live buckets.
pub struct RateDetector {
    window: Duration,
    threshold: f64,

    /// Bucket seconds are counted from here
    origin: Instant,

    /// (second, count), oldest first
    buckets: Mutex<VecDeque<(u64, u64)>>,
}

impl RateDetector {
    /// A window under one second falls back to 10s and a non-positive
    /// threshold to 3.0
    pub fn new(window: Duration, threshold: f64) -> Self {
        Self {
            window: if window < Duration::from_secs(1) {
                DEFAULT_WINDOW
            } else {
                window
            },
            threshold: if threshold > 0.0 {
                threshold
            } else {
                DEFAULT_THRESHOLD
            },
            origin: Instant::now(),
            buckets: Mutex::new(VecDeque::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Record one event now, returning true while spiking
    pub fn record(&self) -> bool {
        self.record_batch_at(Instant::now(), 1)
    }

    /// Record `count` events now, returning true while spiking
    pub fn record_batch(&self, count: u64) -> bool {
        self.record_batch_at(Instant::now(), count)
    }

    pub fn record_batch_at(&self, now: Instant, count: u64) -> bool {
        let mut buckets = self.buckets.lock();
        self.prune(&mut buckets, now);
        if count == 0 {
            return false;
        }

        let second = self.second(now);
        match buckets.back_mut() {
            Some((last, n)) if *last == second => *n += count,
            _ => buckets.push_back((second, count)),
        }

        self.is_spiking(&buckets)
    }

    /// Events per second over the window
    pub fn current_rate(&self) -> f64 {
        self.current_rate_at(Instant::now())
    }

    pub fn current_rate_at(&self, now: Instant) -> f64 {
        let mut buckets = self.buckets.lock();
        self.prune(&mut buckets, now);
        let total: u64 = buckets.iter().map(|(_, n)| n).sum();
        total as f64 / self.window.as_secs_f64()
    }

    /// Events in the current second (0 if none yet)
    pub fn latest_second_rate(&self) -> u64 {
        self.latest_second_rate_at(Instant::now())
    }

    pub fn latest_second_rate_at(&self, now: Instant) -> u64 {
        let mut buckets = self.buckets.lock();
        self.prune(&mut buckets, now);
        match buckets.back() {
            Some((second, n)) if *second == self.second(now) => *n,
            _ => 0,
        }
    }

    fn second(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.origin).as_secs()
    }

    /// Drop buckets that started before `now - window`
    fn prune(&self, buckets: &mut VecDeque<(u64, u64)>, now: Instant) {
        let elapsed = now.saturating_duration_since(self.origin);
        while let Some((second, _)) = buckets.front() {
            if Duration::from_secs(*second) + self.window < elapsed {
                buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_spiking(&self, buckets: &VecDeque<(u64, u64)>) -> bool {
        if buckets.len() < MIN_BUCKETS {
            return false;
        }
        let Some((_, latest)) = buckets.back() else {
            return false;
        };

        let previous = buckets.len() - 1;
        let sum: u64 = buckets.iter().take(previous).map(|(_, n)| n).sum();
        let avg = sum as f64 / previous as f64;
        if avg == 0.0 {
            return false;
        }
        *latest as f64 > avg * self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_spike_only_on_burst() {
        let detector = RateDetector::new(secs(10), 3.0);
        let start = Instant::now();

        assert!(!detector.record_batch_at(start, 1));
        assert!(!detector.record_batch_at(start + secs(1), 1));
        assert!(!detector.record_batch_at(start + secs(2), 1));
        assert!(detector.record_batch_at(start + secs(3), 10));
    }

    #[test]
    fn test_no_spike_below_threshold() {
        let detector = RateDetector::new(secs(10), 3.0);
        let start = Instant::now();

        detector.record_batch_at(start, 2);
        detector.record_batch_at(start + secs(1), 2);
        // 6 is not strictly greater than 3 x 2
        assert!(!detector.record_batch_at(start + secs(2), 6));
        assert!(detector.record_batch_at(start + secs(2), 1));
    }

    #[test]
    fn test_needs_three_buckets() {
        let detector = RateDetector::new(secs(10), 3.0);
        let start = Instant::now();

        detector.record_batch_at(start, 1);
        assert!(!detector.record_batch_at(start + secs(1), 100));
    }

    #[test]
    fn test_old_buckets_are_pruned() {
        let detector = RateDetector::new(secs(5), 3.0);
        let start = Instant::now();

        detector.record_batch_at(start, 50);
        assert!((detector.current_rate_at(start) - 10.0).abs() < f64::EPSILON);
        assert_eq!(detector.current_rate_at(start + secs(20)), 0.0);

        // The 50 event burst is outside the window and no longer inflates the average
        detector.record_batch_at(start + secs(20), 1);
        detector.record_batch_at(start + secs(21), 1);
        assert!(detector.record_batch_at(start + secs(22), 4));
    }

    #[test]
    fn test_latest_second_rate() {
        let detector = RateDetector::new(secs(10), 3.0);
        let start = Instant::now();

        assert_eq!(detector.latest_second_rate_at(start), 0);
        detector.record_batch_at(start, 3);
        detector.record_batch_at(start, 2);
        assert_eq!(detector.latest_second_rate_at(start), 5);
        assert_eq!(detector.latest_second_rate_at(start + secs(1)), 0);
    }

    #[test]
    fn test_defaults() {
        let detector = RateDetector::new(Duration::from_millis(10), 0.0);
        assert_eq!(detector.window(), secs(10));
        assert_eq!(detector.threshold(), 3.0);
        assert!(!detector.record());
        assert_eq!(detector.latest_second_rate(), 1);
    }
}
