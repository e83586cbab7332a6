//! Tunables for the core runtime

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Core configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoreConfig {
    /// Sliding window of the log deduplicator
    pub dedup_window_ms: u64,
    /// Identical lines allowed inside one window before suppression
    pub dedup_threshold: usize,
    /// Maximum number of activity items kept
    pub activity_cap: usize,
    /// Quiet period before an edit is persisted as a draft
    pub autosave_debounce_ms: u64,
    /// Maximum number of version snapshots per edit target
    pub version_cap: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            dedup_window_ms: 5000,
            dedup_threshold: 3,
            activity_cap: 250,
            autosave_debounce_ms: 600,
            version_cap: 5,
        }
    }
}

impl CoreConfig {
    pub fn with_dedup_window_ms(mut self, ms: u64) -> Self {
        self.dedup_window_ms = ms;
        self
    }

    pub fn with_dedup_threshold(mut self, threshold: usize) -> Self {
        self.dedup_threshold = threshold;
        self
    }

    pub fn with_activity_cap(mut self, cap: usize) -> Self {
        self.activity_cap = cap;
        self
    }

    pub fn with_autosave_debounce_ms(mut self, ms: u64) -> Self {
        self.autosave_debounce_ms = ms;
        self
    }

    pub fn with_version_cap(mut self, cap: usize) -> Self {
        self.version_cap = cap;
        self
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn autosave_debounce(&self) -> Duration {
        Duration::from_millis(self.autosave_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.dedup_window(), Duration::from_millis(5000));
        assert_eq!(config.dedup_threshold, 3);
        assert_eq!(config.activity_cap, 250);
        assert_eq!(config.autosave_debounce(), Duration::from_millis(600));
        assert_eq!(config.version_cap, 5);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: CoreConfig = serde_json::from_str(r#"{"activityCap": 10}"#).unwrap();
        assert_eq!(config.activity_cap, 10);
        assert_eq!(config.dedup_threshold, 3);
    }
}
