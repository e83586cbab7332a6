//! Authentication methods for the REST API client

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Authentication methods supported by the backend
#[derive(Debug, Clone, Default)]
pub enum AuthMethod {
    /// API key authentication (`Authorization: ApiKey <token>`)
    ApiKey(String),
    /// Bearer token authentication (`Authorization: Bearer <token>`)
    Bearer(String),
    /// No authentication
    #[default]
    None,
}

impl AuthMethod {
    /// Apply authentication headers to a request
    pub fn apply_to_headers(
        &self,
        headers: &mut HeaderMap,
    ) -> Result<(), reqwest::header::InvalidHeaderValue> {
        let value = match self {
            AuthMethod::ApiKey(token) => format!("ApiKey {}", token),
            AuthMethod::Bearer(token) => format!("Bearer {}", token),
            AuthMethod::None => return Ok(()),
        };
        headers.insert(
            HeaderName::from_static("authorization"),
            HeaderValue::from_str(&value)?,
        );
        Ok(())
    }

    pub fn api_key(token: impl Into<String>) -> Self {
        Self::ApiKey(token.into())
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer(token.into())
    }
}

/// Authentication configuration for the client
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub method: AuthMethod,
}

impl AuthConfig {
    pub fn with_api_key(token: impl Into<String>) -> Self {
        Self {
            method: AuthMethod::api_key(token),
        }
    }

    pub fn with_bearer(token: impl Into<String>) -> Self {
        Self {
            method: AuthMethod::bearer(token),
        }
    }

    /// Headers for this configuration
    pub fn headers(&self) -> Result<HeaderMap, reqwest::header::InvalidHeaderValue> {
        let mut headers = HeaderMap::new();
        self.method.apply_to_headers(&mut headers)?;
        Ok(headers)
    }
}
