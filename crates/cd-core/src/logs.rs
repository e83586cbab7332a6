//! Log ledger: per-crew append-ordered log entries

use std::collections::HashMap;
use std::fmt;

use cd_api_contract::CrewLogPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// Map a free-form level name onto the four known levels
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return LogLevel::Info;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => LogLevel::Debug,
            "warning" | "warn" => LogLevel::Warning,
            "error" | "err" | "critical" | "fatal" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub agent: String,
    pub crew_id: String,
    pub message: String,
    pub category: Option<String>,
    pub operation_id: Option<String>,
    pub sequence: Option<u64>,
    pub is_duplicate: bool,
    pub duplicate_count: u32,
    pub operation_status: Option<String>,
    pub total_steps: Option<u32>,
}

impl From<CrewLogPayload> for LogEntry {
    fn from(payload: CrewLogPayload) -> Self {
        let agent = payload.agent.trim();
        Self {
            timestamp: payload.timestamp,
            level: LogLevel::normalize(payload.level.as_deref()),
            agent: if agent.is_empty() { "system" } else { agent }.to_string(),
            crew_id: payload.crew_id.trim().to_string(),
            message: payload.message,
            category: payload.category,
            operation_id: payload.operation_id,
            sequence: payload.sequence,
            is_duplicate: payload.is_duplicate,
            duplicate_count: payload.duplicate_count.unwrap_or(1),
            operation_status: payload.operation_status,
            total_steps: payload.total_steps,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogLedger {
    entries: HashMap<String, Vec<LogEntry>>,
}

impl LogLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries
            .entry(entry.crew_id.clone())
            .or_default()
            .push(entry);
    }

    /// Update the duplicate count of the entry matching `duplicate`'s
    /// (operation id, sequence). Returns false when no such entry is held.
    pub fn merge_duplicate(&mut self, duplicate: &LogEntry) -> bool {
        let (Some(operation_id), Some(sequence)) = (&duplicate.operation_id, duplicate.sequence)
        else {
            return false;
        };
        let Some(entries) = self.entries.get_mut(&duplicate.crew_id) else {
            return false;
        };

        match entries.iter_mut().rev().find(|entry| {
            entry.operation_id.as_ref() == Some(operation_id) && entry.sequence == Some(sequence)
        }) {
            Some(original) => {
                original.duplicate_count = duplicate
                    .duplicate_count
                    .max(original.duplicate_count.saturating_add(1));
                true
            }
            None => false,
        }
    }

    pub fn logs(&self, crew_id: &str) -> &[LogEntry] {
        self.entries
            .get(crew_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn last(&self, crew_id: &str) -> Option<&LogEntry> {
        self.logs(crew_id).last()
    }

    pub fn total_len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}
