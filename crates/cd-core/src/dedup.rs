//! Sliding-window suppression of repeated log lines
//!
//! Keyed by exact `(agent, message)`. Only occurrences that were let
//! through are remembered, so a burst settles at `threshold` lines per
//! window.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Keys are swept after this many checks
const PRUNE_INTERVAL: usize = 256;

#[derive(Debug, Clone)]
pub struct LogDeduplicator {
    window: Duration,
    threshold: usize,
    recent: HashMap<(String, String), Vec<Instant>>,
    checks: usize,
}

impl LogDeduplicator {
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            recent: HashMap::new(),
            checks: 0,
        }
    }

    /// Check a candidate at the current instant; true means suppress it
    pub fn check(&mut self, agent: &str, message: &str) -> bool {
        self.check_at(agent, message, Instant::now())
    }

    pub fn check_at(&mut self, agent: &str, message: &str, now: Instant) -> bool {
        self.checks += 1;
        if self.checks % PRUNE_INTERVAL == 0 {
            self.prune(now);
        }

        let window = self.window;
        let times = self
            .recent
            .entry((agent.to_string(), message.to_string()))
            .or_default();
        times.retain(|seen| now.saturating_duration_since(*seen) <= window);

        if times.len() >= self.threshold {
            return true;
        }
        times.push(now);
        false
    }

    /// Drop expired timestamps and keys left empty
    pub fn prune(&mut self, now: Instant) {
        let window = self.window;
        self.recent.retain(|_, times| {
            times.retain(|seen| now.saturating_duration_since(*seen) <= window);
            !times.is_empty()
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.recent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup() -> LogDeduplicator {
        LogDeduplicator::new(Duration::from_millis(5000), 3)
    }

    #[test]
    fn test_fourth_identical_line_suppressed() {
        let mut dedup = dedup();
        let start = Instant::now();

        for i in 0..3 {
            let at = start + Duration::from_millis(i * 100);
            assert!(!dedup.check_at("researcher", "searching", at));
        }
        assert!(dedup.check_at("researcher", "searching", start + Duration::from_millis(400)));
    }

    #[test]
    fn test_keys_counted_independently() {
        let mut dedup = dedup();
        let now = Instant::now();

        for _ in 0..3 {
            dedup.check_at("researcher", "searching", now);
        }
        assert!(!dedup.check_at("writer", "searching", now));
        assert!(!dedup.check_at("researcher", "writing", now));
        assert!(dedup.check_at("researcher", "searching", now));
    }

    #[test]
    fn test_window_expiry_readmits() {
        let mut dedup = dedup();
        let start = Instant::now();

        for _ in 0..3 {
            dedup.check_at("a", "m", start);
        }
        assert!(dedup.check_at("a", "m", start + Duration::from_millis(4999)));
        assert!(!dedup.check_at("a", "m", start + Duration::from_millis(5001)));
    }

    #[test]
    fn test_suppressed_lines_do_not_extend_window() {
        let mut dedup = dedup();
        let start = Instant::now();

        for _ in 0..3 {
            dedup.check_at("a", "m", start);
        }
        for ms in [1000, 2000, 3000, 4000] {
            assert!(dedup.check_at("a", "m", start + Duration::from_millis(ms)));
        }
        assert!(!dedup.check_at("a", "m", start + Duration::from_millis(5500)));
    }

    #[test]
    fn test_prune_removes_stale_keys() {
        let mut dedup = dedup();
        let start = Instant::now();
        dedup.check_at("a", "m", start);
        dedup.check_at("b", "m", start + Duration::from_millis(4000));

        dedup.prune(start + Duration::from_millis(6000));
        assert_eq!(dedup.tracked_keys(), 1);
    }
}
