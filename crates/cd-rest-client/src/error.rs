//! Error types for the REST API client

use cd_api_contract::{ApiContractError, ProblemDetails};
use cd_client_api::{is_unreachable_status, ClientApiError};
use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when using the REST API client
#[derive(Debug, Error)]
pub enum RestClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Base URL cannot carry a path: {0}")]
    InvalidBaseUrl(String),

    #[error("API contract error: {0}")]
    ApiContract(#[from] ApiContractError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Server returned error status {status} for {endpoint}: {}", .details.message())]
    ServerError {
        status: StatusCode,
        endpoint: String,
        details: ProblemDetails,
    },

    #[error("Unexpected response {status} from {endpoint}: {body}")]
    UnexpectedResponse {
        status: StatusCode,
        endpoint: String,
        body: String,
    },

    #[error("Socket error on {endpoint}: {message}")]
    Socket { endpoint: String, message: String },
}

/// Result type alias for REST client operations
pub type RestClientResult<T> = Result<T, RestClientError>;

impl From<RestClientError> for ClientApiError {
    fn from(err: RestClientError) -> Self {
        match err {
            RestClientError::Http(e) if e.is_decode() => ClientApiError::Unexpected(e.to_string()),
            RestClientError::Http(e) => {
                // Connection refused, timeouts and dropped bodies all mean no usable response
                let endpoint = e
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "the backend server".to_string());
                ClientApiError::network(endpoint, e.to_string())
            }
            RestClientError::ServerError {
                status,
                endpoint,
                details,
            } => {
                if is_unreachable_status(status.as_u16()) {
                    ClientApiError::network(endpoint, status.to_string())
                } else {
                    ClientApiError::Application(details.message())
                }
            }
            RestClientError::UnexpectedResponse {
                status, endpoint, ..
            } => {
                if is_unreachable_status(status.as_u16()) {
                    ClientApiError::network(endpoint, status.to_string())
                } else {
                    ClientApiError::Application(format!(
                        "Request failed with status code {}",
                        status.as_u16()
                    ))
                }
            }
            RestClientError::Socket { endpoint, message } => ClientApiError::network(endpoint, message),
            RestClientError::ApiContract(e) => ClientApiError::Contract(e.to_string()),
            RestClientError::Json(e) => ClientApiError::Contract(e.to_string()),
            other => ClientApiError::Unexpected(other.to_string()),
        }
    }
}
