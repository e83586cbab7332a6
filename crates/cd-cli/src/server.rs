//! Backend connection arguments shared by every command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cd_core::{CoreConfig, Dashboard};
use cd_local_db::Database;
use cd_rest_client::{AuthConfig, BackendChannel, RestClient, DEFAULT_SOCKET_PATH};
use clap::Args;

pub type RestDashboard = Dashboard<RestClient, BackendChannel>;

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    /// Base URL of the crew backend
    #[arg(
        long,
        global = true,
        env = "CREWDECK_SERVER",
        default_value = "http://localhost:8001"
    )]
    pub server: String,

    /// API key for authenticating with the backend
    #[arg(long, global = true, env = "CREWDECK_API_KEY")]
    pub api_key: Option<String>,

    /// Bearer token for authenticating with the backend
    #[arg(long, global = true)]
    pub bearer_token: Option<String>,

    /// Mount path of the backend Socket.IO endpoint
    #[arg(long, global = true, default_value = DEFAULT_SOCKET_PATH)]
    pub socket_path: String,

    /// Local state database (defaults to $CREWDECK_HOME/state.db)
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,
}

impl ServerArgs {
    pub fn auth(&self) -> Result<AuthConfig> {
        match (&self.api_key, &self.bearer_token) {
            (Some(_), Some(_)) => anyhow::bail!("Cannot specify both --api-key and --bearer-token"),
            (Some(key), None) => Ok(AuthConfig::with_api_key(key.clone())),
            (None, Some(token)) => Ok(AuthConfig::with_bearer(token.clone())),
            (None, None) => Ok(AuthConfig::default()),
        }
    }

    pub fn client(&self) -> Result<RestClient> {
        RestClient::from_url(&self.server, self.auth()?)
            .with_context(|| format!("Invalid server URL {}", self.server))
    }

    pub fn dashboard(&self) -> Result<RestDashboard> {
        let client = self.client()?;
        let channel = BackendChannel::new(client.clone(), &self.socket_path)
            .with_context(|| format!("Invalid socket path {}", self.socket_path))?;
        Ok(Dashboard::new(
            Arc::new(client),
            Arc::new(channel),
            CoreConfig::default(),
        ))
    }

    pub fn database(&self) -> Result<Database> {
        let db = match &self.db {
            Some(path) => Database::open(path),
            None => Database::open_default(),
        };
        db.context("Failed to open local state database")
    }
}
