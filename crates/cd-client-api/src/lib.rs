//! Client API traits for the crewdeck core
//!
//! The core never talks to the network directly. Everything it needs from
//! the backend goes through [`ClientApi`] (request/response resources) and
//! [`ChannelTransport`] (the persistent push/command channel), so tests and
//! scenarios can substitute scripted implementations.

use async_trait::async_trait;
use cd_api_contract::*;
use futures::stream::BoxStream;
use thiserror::Error;

/// Classified failure of a backend interaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientApiError {
    /// No response was received, or a gateway reported the backend unavailable
    #[error(
        "Unable to reach {endpoint} ({message}). Check that the backend server is running and reachable."
    )]
    Network { endpoint: String, message: String },
    /// The request reached the server, which rejected it with a structured detail
    #[error("{0}")]
    Application(String),
    /// The server answered with a payload that violates the wire contract
    #[error("invalid payload: {0}")]
    Contract(String),
    #[error("unexpected: {0}")]
    Unexpected(String),
}

impl ClientApiError {
    pub fn network(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Whether this failure means the backend could not be reached at all
    pub fn is_network(&self) -> bool {
        matches!(self, ClientApiError::Network { .. })
    }
}

impl From<ApiContractError> for ClientApiError {
    fn from(err: ApiContractError) -> Self {
        ClientApiError::Contract(err.to_string())
    }
}

/// HTTP statuses that mean a proxy in front of the backend could not reach it
pub fn is_unreachable_status(status: u16) -> bool {
    matches!(status, 502..=504)
}

pub type ClientApiResult<T> = Result<T, ClientApiError>;

/// Stream of validated channel events
pub type EventStream = BoxStream<'static, ClientApiResult<ChannelEvent>>;

/// Request/response resources served by the backend
#[async_trait]
pub trait ClientApi: Send + Sync {
    /// Full crew catalog
    async fn list_crews(&self) -> ClientApiResult<Vec<CrewSummary>>;

    /// Backlog of recent activity records
    async fn activity_history(&self) -> ClientApiResult<Vec<HistoryRecord>>;

    /// Canonical configuration text for a target
    async fn get_config_text(&self, target: &ConfigTarget) -> ClientApiResult<String>;

    /// Replace the canonical configuration text for a target
    async fn save_config_text(&self, target: &ConfigTarget, content: &str)
        -> ClientApiResult<()>;

    /// Environment files available for a crew
    async fn list_env_files(&self, crew_id: &str) -> ClientApiResult<Vec<String>>;
}

/// Persistent push/command channel
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open the inbound event stream; dropping the stream closes it
    async fn subscribe(&self) -> ClientApiResult<EventStream>;

    /// Emit a command to the server
    async fn send(&self, command: &ChannelCommand) -> ClientApiResult<()>;
}
