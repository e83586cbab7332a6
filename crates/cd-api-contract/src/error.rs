//! Error types for contract validation and parsing

use thiserror::Error;

/// Errors that can occur while parsing or validating wire payloads
#[derive(Debug, Error)]
pub enum ApiContractError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown channel event: {0}")]
    UnknownEvent(String),

    #[error("Invalid payload for '{event}': {message}")]
    InvalidPayload { event: String, message: String },
}

impl ApiContractError {
    /// Create an invalid payload error for the given event name
    pub fn invalid_payload(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event: event.into(),
            message: message.into(),
        }
    }
}

/// Error body returned by the backend for failed requests
///
/// The backend reports failures as `{"detail": ...}` where the detail is
/// usually a string but may be a structured list of field errors.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProblemDetails {
    #[serde(default)]
    pub detail: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub title: Option<String>,
}

impl ProblemDetails {
    /// The detail rendered as text, verbatim when the server sent a string
    pub fn message(&self) -> String {
        match &self.detail {
            serde_json::Value::String(text) => text.clone(),
            serde_json::Value::Null => self.title.clone().unwrap_or_default(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_details_string_detail() {
        let problem: ProblemDetails =
            serde_json::from_str(r#"{"detail": "Crew 'demo' not found"}"#).unwrap();
        assert_eq!(problem.message(), "Crew 'demo' not found");
    }

    #[test]
    fn test_problem_details_structured_detail() {
        let problem: ProblemDetails =
            serde_json::from_str(r#"{"detail": [{"loc": ["body"], "msg": "field required"}]}"#)
                .unwrap();
        assert!(problem.message().contains("field required"));
    }
}
