//! Bounded, time-ordered activity feed

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::logs::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Log,
    Lifecycle,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: ActivityKind,
    pub crew_id: Option<String>,
    pub crew_name: Option<String>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ActivityItem {
    pub fn new(kind: ActivityKind, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            crew_id: None,
            crew_name: None,
            level,
            message: message.into(),
            metadata: Map::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn for_crew(mut self, crew_id: impl Into<String>, crew_name: Option<String>) -> Self {
        self.crew_id = Some(crew_id.into());
        self.crew_name = crew_name;
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// FIFO-bounded feed, oldest item first
#[derive(Debug, Clone)]
pub struct ActivityFeed {
    items: VecDeque<ActivityItem>,
    cap: usize,
}

impl ActivityFeed {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap.min(1024)),
            cap,
        }
    }

    /// Insert by timestamp (after equal timestamps) and evict the oldest beyond the cap
    pub fn push(&mut self, item: ActivityItem) {
        let index = self
            .items
            .iter()
            .rposition(|held| held.timestamp <= item.timestamp)
            .map_or(0, |i| i + 1);
        self.items.insert(index, item);

        while self.items.len() > self.cap {
            self.items.pop_front();
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &ActivityItem> {
        self.items.iter()
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &ActivityItem> {
        self.items.iter().rev()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn item(message: &str, at: DateTime<Utc>) -> ActivityItem {
        ActivityItem::new(ActivityKind::System, LogLevel::Info, message).at(at)
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let mut feed = ActivityFeed::new(250);
        let start = Utc::now();
        for i in 0..251 {
            feed.push(item(&format!("event {i}"), start + Duration::milliseconds(i)));
        }

        assert_eq!(feed.len(), 250);
        assert_eq!(feed.iter().next().unwrap().message, "event 1");
        assert_eq!(feed.newest_first().next().unwrap().message, "event 250");
    }

    #[test]
    fn test_backfilled_items_sorted_by_time() {
        let mut feed = ActivityFeed::new(10);
        let now = Utc::now();
        feed.push(item("live", now));
        feed.push(item("history", now - Duration::minutes(5)));

        let order: Vec<_> = feed.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(order, vec!["history", "live"]);
    }

    #[test]
    fn test_equal_timestamps_keep_arrival_order() {
        let mut feed = ActivityFeed::new(10);
        let now = Utc::now();
        feed.push(item("first", now));
        feed.push(item("second", now));

        let order: Vec<_> = feed.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
    }
}
