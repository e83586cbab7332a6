//! Core error types

use cd_client_api::ClientApiError;

/// One offending start parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputIssue {
    pub parameter: String,
    pub message: String,
}

impl InputIssue {
    pub fn new(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for InputIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.parameter, self.message)
    }
}

fn join_issues(issues: &[InputIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Core error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    /// Pre-flight input validation failed; nothing was sent
    #[error("Invalid inputs: {}", join_issues(.issues))]
    Validation { issues: Vec<InputIssue> },

    #[error("Unknown crew: {0}")]
    UnknownCrew(String),

    #[error("Crew {crew_id} is already {state}")]
    InvalidState { crew_id: String, state: String },

    /// Network, application or contract failure reported by a collaborator
    #[error(transparent)]
    Client(#[from] ClientApiError),

    /// Asynchronous failure of a dispatched crew
    #[error("Crew {crew_id} failed: {message}")]
    RuntimeJob { crew_id: String, message: String },

    /// Server-side error not tied to a crew
    #[error("Server error: {0}")]
    Server(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl CoreError {
    pub fn validation(issues: Vec<InputIssue>) -> Self {
        Self::Validation { issues }
    }

    pub fn runtime_job(crew_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RuntimeJob {
            crew_id: crew_id.into(),
            message: message.into(),
        }
    }

    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    pub fn is_network(&self) -> bool {
        matches!(self, CoreError::Client(err) if err.is_network())
    }
}

impl From<cd_local_db::Error> for CoreError {
    fn from(err: cd_local_db::Error) -> Self {
        CoreError::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_parameter() {
        let err = CoreError::validation(vec![
            InputIssue::new("topic", "is required"),
            InputIssue::new("count", "must be at least 1"),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid inputs: topic is required; count must be at least 1"
        );
    }

    #[test]
    fn test_network_classification_passes_through() {
        let err: CoreError = ClientApiError::network("http://localhost:8001", "refused").into();
        assert!(err.is_network());
        assert!(!CoreError::Server("boom".into()).is_network());
    }
}
