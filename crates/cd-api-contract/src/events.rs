//! Named events and commands carried by the push channel

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use crate::error::ApiContractError;
use crate::types::{CrewSummary, HistoryRecord};

fn default_agent() -> String {
    "system".to_string()
}

fn default_error_message() -> String {
    "Unknown error".to_string()
}

/// Log line streamed from a running crew
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CrewLogPayload {
    #[serde(alias = "crew_id")]
    #[validate(length(min = 1, message = "Log entry is missing its crew id"))]
    pub crew_id: String,
    #[serde(default = "default_agent")]
    pub agent: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sequence: Option<u64>,
    #[serde(default)]
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub duplicate_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub operation_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub total_steps: Option<u32>,
}

/// Crew lifecycle notification (started, start acknowledged, stopped, stop requested)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CrewLifecyclePayload {
    #[serde(alias = "crewId")]
    #[validate(length(min = 1, message = "Lifecycle event is missing its crew id"))]
    pub crew_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub process_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exit_code: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<String>,
}

impl CrewLifecyclePayload {
    pub fn new(crew_id: impl Into<String>) -> Self {
        Self {
            crew_id: crew_id.into(),
            process_id: None,
            exit_code: None,
            status: None,
        }
    }
}

/// Asynchronous failure of a crew that was already dispatched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CrewErrorPayload {
    #[serde(alias = "crewId")]
    #[validate(length(min = 1, message = "Error event is missing its crew id"))]
    pub crew_id: String,
    #[serde(default = "default_error_message")]
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub status: Option<String>,
}

/// Generic server-side error not tied to a crew
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerErrorPayload {
    #[serde(default = "default_error_message")]
    pub message: String,
}

/// Event pushed by the server over the persistent channel
///
/// Serialized adjacently tagged as `{"event": <wire name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChannelEvent {
    #[serde(rename = "crew_log")]
    CrewLog(CrewLogPayload),
    #[serde(rename = "crews_updated")]
    CrewsUpdated(Vec<CrewSummary>),
    #[serde(rename = "crew_updated")]
    CrewUpdated(CrewSummary),
    #[serde(rename = "crew_started")]
    CrewStarted(CrewLifecyclePayload),
    #[serde(rename = "crew_start_ack")]
    CrewStartAck(CrewLifecyclePayload),
    #[serde(rename = "crew_stopped")]
    CrewStopped(CrewLifecyclePayload),
    #[serde(rename = "stop_requested")]
    StopRequested(CrewLifecyclePayload),
    #[serde(rename = "crew_error")]
    CrewError(CrewErrorPayload),
    #[serde(rename = "activity_history")]
    ActivityHistory(Vec<HistoryRecord>),
    #[serde(rename = "error")]
    ServerError(ServerErrorPayload),
}

impl ChannelEvent {
    /// Wire names of every event this client understands
    pub const NAMES: [&'static str; 10] = [
        "crew_log",
        "crews_updated",
        "crew_updated",
        "crew_started",
        "crew_start_ack",
        "crew_stopped",
        "stop_requested",
        "crew_error",
        "activity_history",
        "error",
    ];

    /// Parse a named event and its JSON payload, rejecting anything malformed
    pub fn from_wire(name: &str, data: Value) -> Result<Self, ApiContractError> {
        if !Self::NAMES.contains(&name) {
            return Err(ApiContractError::UnknownEvent(name.to_string()));
        }

        let tagged = serde_json::json!({ "event": name, "data": data });
        let event: ChannelEvent = serde_json::from_value(tagged)
            .map_err(|e| ApiContractError::invalid_payload(name, e.to_string()))?;
        crate::validation::validate_channel_event(&event)?;
        Ok(event)
    }

    /// Parse a named event from raw JSON text
    pub fn from_wire_str(name: &str, data: &str) -> Result<Self, ApiContractError> {
        let value: Value = serde_json::from_str(data)
            .map_err(|e| ApiContractError::invalid_payload(name, e.to_string()))?;
        Self::from_wire(name, value)
    }

    /// Wire name of this event
    pub fn name(&self) -> &'static str {
        match self {
            ChannelEvent::CrewLog(_) => "crew_log",
            ChannelEvent::CrewsUpdated(_) => "crews_updated",
            ChannelEvent::CrewUpdated(_) => "crew_updated",
            ChannelEvent::CrewStarted(_) => "crew_started",
            ChannelEvent::CrewStartAck(_) => "crew_start_ack",
            ChannelEvent::CrewStopped(_) => "crew_stopped",
            ChannelEvent::StopRequested(_) => "stop_requested",
            ChannelEvent::CrewError(_) => "crew_error",
            ChannelEvent::ActivityHistory(_) => "activity_history",
            ChannelEvent::ServerError(_) => "error",
        }
    }
}

/// Command emitted by the client over the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "data")]
pub enum ChannelCommand {
    #[serde(rename = "startCrew")]
    StartCrew {
        crew_id: String,
        inputs: Map<String, Value>,
    },
    #[serde(rename = "stopCrew")]
    StopCrew { crew_id: String },
}

impl ChannelCommand {
    pub fn crew_id(&self) -> &str {
        match self {
            ChannelCommand::StartCrew { crew_id, .. } => crew_id,
            ChannelCommand::StopCrew { crew_id } => crew_id,
        }
    }

    /// Wire name of this command
    pub fn name(&self) -> &'static str {
        match self {
            ChannelCommand::StartCrew { .. } => "startCrew",
            ChannelCommand::StopCrew { .. } => "stopCrew",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crew_log_from_broadcaster_shape() {
        let data = json!({
            "crewId": "demo",
            "message": "Agent researcher: searching sources",
            "level": "info",
            "timestamp": "2025-03-01T10:00:00.123456Z",
            "category": "SEARCH",
            "agent": "researcher",
            "operationId": "17408232001234",
            "sequence": 2,
            "isDuplicate": false,
            "duplicateCount": 1
        });

        let event = ChannelEvent::from_wire("crew_log", data).unwrap();
        match event {
            ChannelEvent::CrewLog(log) => {
                assert_eq!(log.crew_id, "demo");
                assert_eq!(log.operation_id.as_deref(), Some("17408232001234"));
                assert_eq!(log.sequence, Some(2));
                assert!(!log.is_duplicate);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_streaming_error_log_defaults_agent() {
        let data = json!({
            "crewId": "demo",
            "message": "Error in log streaming: boom",
            "level": "error",
            "timestamp": "2025-03-01T10:00:00Z"
        });

        let ChannelEvent::CrewLog(log) = ChannelEvent::from_wire("crew_log", data).unwrap() else {
            panic!("expected crew_log");
        };
        assert_eq!(log.agent, "system");
    }

    #[test]
    fn test_unknown_event_rejected() {
        let err = ChannelEvent::from_wire("system_stats", json!({})).unwrap_err();
        assert!(matches!(err, ApiContractError::UnknownEvent(name) if name == "system_stats"));
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let err = ChannelEvent::from_wire("crew_started", json!({"process_id": "1"})).unwrap_err();
        assert!(matches!(err, ApiContractError::InvalidPayload { .. }));
    }

    #[test]
    fn test_blank_crew_id_rejected() {
        let err = ChannelEvent::from_wire("crew_stopped", json!({"crew_id": ""})).unwrap_err();
        assert!(matches!(err, ApiContractError::Validation(_)));
    }

    #[test]
    fn test_command_serialization() {
        let mut inputs = Map::new();
        inputs.insert("topic".into(), json!("AI"));
        let command = ChannelCommand::StartCrew {
            crew_id: "j1".into(),
            inputs,
        };

        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(
            value,
            json!({"command": "startCrew", "data": {"crew_id": "j1", "inputs": {"topic": "AI"}}})
        );
        assert_eq!(command.name(), "startCrew");
    }
}
