//! Contract types for the crew backend REST resources

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use validator::Validate;

/// Input parameter declaration discovered from a crew's entry point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputParam {
    /// Declared type name (`str`, `int`, `float`, `bool`, `date`, `list`, `dict`, ...)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none", default)]
    pub param_type: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Lower bound, a number or a `YYYY-MM-DD` date string
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub min: Option<Value>,
    /// Upper bound, a number or a `YYYY-MM-DD` date string
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub options: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

/// Agent detail object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDetail {
    #[serde(alias = "id")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
}

/// Agent reference, either a bare name or a detail object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentRef {
    Name(String),
    Detailed(AgentDetail),
}

impl AgentRef {
    pub fn name(&self) -> &str {
        match self {
            AgentRef::Name(name) => name,
            AgentRef::Detailed(detail) => &detail.name,
        }
    }

    pub fn role(&self) -> Option<&str> {
        match self {
            AgentRef::Name(_) => None,
            AgentRef::Detailed(detail) => detail.role.as_deref(),
        }
    }
}

/// Task detail object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDetail {
    #[serde(alias = "id")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

/// Task reference, either a bare name or a detail object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRef {
    Name(String),
    Detailed(TaskDetail),
}

impl TaskRef {
    pub fn name(&self) -> &str {
        match self {
            TaskRef::Name(name) => name,
            TaskRef::Detailed(detail) => &detail.name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            TaskRef::Name(_) => None,
            TaskRef::Detailed(detail) => detail.description.as_deref(),
        }
    }
}

/// Crew summary as sent by the catalog endpoint and catalog push events
///
/// Every field except the identifier is optional so that a partial summary
/// can be overlaid on an already known crew without erasing fields it does
/// not mention.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct CrewSummary {
    #[validate(length(min = 1, message = "Crew id cannot be empty"))]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agents: Option<Vec<AgentRef>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tasks: Option<Vec<TaskRef>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub inputs: Option<BTreeMap<String, InputParam>>,
    /// Fields this client does not interpret (icon, ordering hints, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CrewSummary {
    /// Create a summary carrying only an identifier
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// One record of the server-side activity backlog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: Value,
}

/// Activity backlog response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityHistoryResponse {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<String>,
    #[serde(default)]
    pub events: Vec<HistoryRecord>,
}

/// Kind of editable configuration text attached to a crew
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigTargetType {
    /// A YAML file such as `agents` or `tasks`
    Yaml,
    /// An environment file such as `.env`
    Env,
}

impl ConfigTargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigTargetType::Yaml => "yaml",
            ConfigTargetType::Env => "env",
        }
    }
}

impl std::fmt::Display for ConfigTargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one editable configuration text
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigTarget {
    pub crew_id: String,
    pub target_type: ConfigTargetType,
    pub name: String,
}

impl ConfigTarget {
    pub fn yaml(crew_id: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            crew_id: crew_id.into(),
            target_type: ConfigTargetType::Yaml,
            name: file_type.into(),
        }
    }

    pub fn env(crew_id: impl Into<String>, env_name: impl Into<String>) -> Self {
        Self {
            crew_id: crew_id.into(),
            target_type: ConfigTargetType::Env,
            name: env_name.into(),
        }
    }
}

/// Configuration text response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentResponse {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub success: Option<bool>,
}

/// Configuration text save request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveContentRequest {
    pub content: String,
}

/// Generic acknowledgement returned by mutating endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckResponse {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub process_id: Option<String>,
    #[serde(default)]
    pub success: bool,
}

/// Environment file listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvFilesResponse {
    #[serde(default)]
    pub files: Vec<String>,
}

/// Body of the REST start endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCrewRequest {
    #[serde(default)]
    pub inputs: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crew_summary_from_backend_shape() {
        let json = r#"{
            "id": "research_crew",
            "name": "Research Crew",
            "description": null,
            "icon": "flask",
            "status": "ready",
            "agents": ["researcher", {"name": "writer", "role": "Technical Writer"}],
            "tasks": ["research_task"],
            "agent_order": ["researcher", "writer"],
            "inputs": {
                "topic": {"type": "str", "default": null, "required": true}
            }
        }"#;

        let crew: CrewSummary = serde_json::from_str(json).unwrap();
        assert_eq!(crew.id, "research_crew");
        assert_eq!(crew.description, None);
        let agents = crew.agents.as_ref().unwrap();
        assert_eq!(agents[0].name(), "researcher");
        assert_eq!(agents[1].role(), Some("Technical Writer"));
        assert_eq!(crew.extra.get("icon"), Some(&Value::String("flask".into())));
        let topic = &crew.inputs.as_ref().unwrap()["topic"];
        assert!(topic.required);
        assert_eq!(topic.param_type.as_deref(), Some("str"));
        assert_eq!(topic.default, None);
    }

    #[test]
    fn test_history_response_parsing() {
        let json = r#"{
            "status": "success",
            "events": [
                {"id": 7, "type": "crew_started", "timestamp": "2025-03-01T10:00:00Z",
                 "data": {"crew_id": "demo"}}
            ]
        }"#;
        let response: ActivityHistoryResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.events.len(), 1);
        assert_eq!(response.events[0].kind, "crew_started");
        assert_eq!(response.events[0].id, 7);
    }
}
