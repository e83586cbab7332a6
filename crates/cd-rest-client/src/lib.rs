//! REST and Socket.IO client for the crew backend
//!
//! Implements [`ClientApi`] for request/response resources and
//! [`ChannelTransport`](cd_client_api::ChannelTransport) via [`BackendChannel`].

pub mod auth;
pub mod channel;
pub mod client;
pub mod error;
pub mod socketio;

pub use auth::*;
pub use channel::*;
pub use client::*;
pub use error::*;
pub use socketio::DEFAULT_SOCKET_PATH;

use async_trait::async_trait;
use cd_api_contract::*;
use cd_client_api::{ClientApi, ClientApiResult};

#[async_trait]
impl ClientApi for client::RestClient {
    async fn list_crews(&self) -> ClientApiResult<Vec<CrewSummary>> {
        Ok(self.list_crews().await?)
    }

    async fn activity_history(&self) -> ClientApiResult<Vec<HistoryRecord>> {
        Ok(self.activity_history().await?.events)
    }

    async fn get_config_text(&self, target: &ConfigTarget) -> ClientApiResult<String> {
        Ok(self.get_config_text(target).await?)
    }

    async fn save_config_text(
        &self,
        target: &ConfigTarget,
        content: &str,
    ) -> ClientApiResult<()> {
        self.save_config_text(target, content).await?;
        Ok(())
    }

    async fn list_env_files(&self, crew_id: &str) -> ClientApiResult<Vec<String>> {
        Ok(self.list_env_files(crew_id).await?.files)
    }
}
