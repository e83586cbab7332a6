//! Scenario model and loader for core tests
//!
//! A scenario seeds the scripted backend (catalog, history backlog, config
//! texts) and lists steps that drive the dashboard and assert on the result.

use std::path::Path;

use cd_api_contract::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration text served by the scripted backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioContent {
    pub target: ConfigTarget,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Step {
    /// Advance the paused clock and fire due timers
    AdvanceMs { ms: u64 },
    /// Fetch the REST catalog and merge it
    LoadCatalog,
    /// Activate the history bootstrapper
    LoadHistory,
    /// Deliver an already typed channel event
    Event { event: ChannelEvent },
    /// Deliver a raw named payload through boundary validation
    RawEvent { name: String, data: Value },
    Start {
        crew_id: String,
        #[serde(default)]
        inputs: Map<String, Value>,
    },
    Stop { crew_id: String },
    View { crew_id: String },
    OpenConfig { target: ConfigTarget },
    Edit { content: String },
    RestoreVersion { index: usize },
    ClearDrafts,
    SaveConfig,
    AssertRunState { crew_id: String, state: String },
    AssertCommands { commands: Vec<ChannelCommand> },
    AssertActivityLen { len: usize },
    AssertLogCount { crew_id: String, count: usize },
    /// `contains: null` asserts that no error is surfaced
    AssertError { contains: Option<String> },
    AssertVisible {
        #[serde(default)]
        query: String,
        #[serde(default)]
        filter: Option<Value>,
        #[serde(default)]
        sort: Option<String>,
        ids: Vec<String>,
    },
    AssertViewed { crew_id: Option<String> },
    AssertEditor {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        versions: Option<usize>,
    },
    AssertDraftWrites { count: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub crews: Vec<CrewSummary>,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
    #[serde(default)]
    pub contents: Vec<ScenarioContent>,
    pub steps: Vec<Step>,
}

impl Scenario {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_str(&text)
    }
}
