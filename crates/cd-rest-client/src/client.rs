//! REST client for the crew backend

use cd_api_contract::*;
use reqwest::{Client as HttpClient, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::auth::AuthConfig;
use crate::error::{RestClientError, RestClientResult};

/// REST API client for the crew backend
#[derive(Debug, Clone)]
pub struct RestClient {
    http_client: HttpClient,
    base_url: Url,
    auth: AuthConfig,
}

impl RestClient {
    pub fn new(base_url: Url, auth: AuthConfig) -> RestClientResult<Self> {
        let http_client = HttpClient::builder()
            .user_agent(concat!("crewdeck/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            auth,
        })
    }

    /// Create a client from a base URL string
    pub fn from_url(base_url: &str, auth: AuthConfig) -> RestClientResult<Self> {
        let base_url = Url::parse(base_url)?;
        Self::new(base_url, auth)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    /// `GET /api/crews`
    pub async fn list_crews(&self) -> RestClientResult<Vec<CrewSummary>> {
        self.get(self.endpoint(&["api", "crews"])?).await
    }

    /// `GET /api/activity`
    pub async fn activity_history(&self) -> RestClientResult<ActivityHistoryResponse> {
        self.get(self.endpoint(&["api", "activity"])?).await
    }

    /// `POST /api/crews/{id}/start`
    pub async fn start_crew(
        &self,
        crew_id: &str,
        inputs: Map<String, Value>,
    ) -> RestClientResult<AckResponse> {
        let body = StartCrewRequest { inputs };
        self.post(self.endpoint(&["api", "crews", crew_id, "start"])?, &body)
            .await
    }

    /// `POST /api/crews/{id}/stop`
    pub async fn stop_crew(&self, crew_id: &str) -> RestClientResult<AckResponse> {
        self.request(
            Method::POST,
            self.endpoint(&["api", "crews", crew_id, "stop"])?,
            None::<&()>,
        )
        .await
    }

    /// `GET /api/crews/{id}/env-files`
    pub async fn list_env_files(&self, crew_id: &str) -> RestClientResult<EnvFilesResponse> {
        self.get(self.endpoint(&["api", "crews", crew_id, "env-files"])?)
            .await
    }

    /// Fetch configuration text: YAML files at `/api/crews/{id}/{file_type}`,
    /// environment files at `/api/crews/{id}/env/{name}`
    pub async fn get_config_text(&self, target: &ConfigTarget) -> RestClientResult<String> {
        let response: ContentResponse = self.get(self.config_url(target)?).await?;
        Ok(response.content)
    }

    /// Replace configuration text
    pub async fn save_config_text(
        &self,
        target: &ConfigTarget,
        content: &str,
    ) -> RestClientResult<AckResponse> {
        let body = SaveContentRequest {
            content: content.to_string(),
        };
        self.post(self.config_url(target)?, &body).await
    }

    /// Absolute URL for a path relative to the base, e.g. `/api/crews`
    pub fn resolve(&self, path: &str) -> RestClientResult<Url> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.endpoint(&segments)
    }

    fn config_url(&self, target: &ConfigTarget) -> RestClientResult<Url> {
        let crew_id = target.crew_id.as_str();
        match target.target_type {
            ConfigTargetType::Yaml => self.endpoint(&["api", "crews", crew_id, target.name.as_str()]),
            ConfigTargetType::Env => {
                self.endpoint(&["api", "crews", crew_id, "env", target.name.as_str()])
            }
        }
    }

    /// Append percent-encoded path segments to the base URL
    fn endpoint(&self, segments: &[&str]) -> RestClientResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RestClientError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> RestClientResult<T> {
        self.request(Method::GET, url, None::<&()>).await
    }

    async fn post<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        url: Url,
        body: &B,
    ) -> RestClientResult<T> {
        self.request(Method::POST, url, Some(body)).await
    }

    async fn request<T: DeserializeOwned, B: serde::Serialize>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> RestClientResult<T> {
        tracing::debug!(%method, %url, "backend request");
        let mut request = self.http_client.request(method, url.clone());

        let auth_headers = self
            .auth
            .headers()
            .map_err(|e| RestClientError::Auth(e.to_string()))?;
        request = request.headers(auth_headers);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        self.handle_response(url, response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        url: Url,
        response: Response,
    ) -> RestClientResult<T> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(RestClientError::from);
        }

        tracing::debug!(%status, %url, "backend request failed");
        match serde_json::from_str::<ProblemDetails>(&text) {
            Ok(details) if !details.detail.is_null() || details.title.is_some() => {
                Err(RestClientError::ServerError {
                    status,
                    endpoint: url.to_string(),
                    details,
                })
            }
            _ => Err(RestClientError::UnexpectedResponse {
                status,
                endpoint: url.to_string(),
                body: text,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a local port
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_client_creation() {
        let client = RestClient::from_url("http://localhost:8001", AuthConfig::default()).unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8001/");
    }

    #[test]
    fn test_endpoints_encode_crew_ids() {
        let client = RestClient::from_url("http://localhost:8001", AuthConfig::default()).unwrap();

        let url = client.endpoint(&["api", "crews", "my crew", "start"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8001/api/crews/my%20crew/start");

        let env = client.config_url(&ConfigTarget::env("j1", ".env")).unwrap();
        assert_eq!(env.as_str(), "http://localhost:8001/api/crews/j1/env/.env");

        let yaml = client.config_url(&ConfigTarget::yaml("j1", "agents")).unwrap();
        assert_eq!(yaml.as_str(), "http://localhost:8001/api/crews/j1/agents");
    }

    #[test]
    fn test_resolve_keeps_base_prefix() {
        let client =
            RestClient::from_url("http://localhost:8001/backend/", AuthConfig::default()).unwrap();
        let url = client.resolve("/api/activity").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8001/backend/api/activity");
    }

    #[tokio::test]
    async fn test_list_crews_parses_catalog() {
        let base = serve_once(
            "200 OK",
            r#"[{"id": "demo", "name": "Demo", "agents": ["a"], "tasks": ["t"], "inputs": {}}]"#,
        )
        .await;
        let client = RestClient::from_url(&base, AuthConfig::default()).unwrap();

        let crews = client.list_crews().await.unwrap();
        assert_eq!(crews.len(), 1);
        assert_eq!(crews[0].id, "demo");
    }

    #[tokio::test]
    async fn test_problem_detail_is_server_error() {
        let base = serve_once("404 Not Found", r#"{"detail": "Crew missing not found"}"#).await;
        let client = RestClient::from_url(&base, AuthConfig::default()).unwrap();

        let err = client.stop_crew("missing").await.unwrap_err();
        match err {
            RestClientError::ServerError { status, details, .. } => {
                assert_eq!(status.as_u16(), 404);
                assert_eq!(details.message(), "Crew missing not found");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gateway_error_without_json() {
        let base = serve_once("503 Service Unavailable", "upstream down").await;
        let client = RestClient::from_url(&base, AuthConfig::default()).unwrap();

        let err = client.list_crews().await.unwrap_err();
        assert!(matches!(
            err,
            RestClientError::UnexpectedResponse { status, .. } if status.as_u16() == 503
        ));
    }
}
