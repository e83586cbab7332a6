//! Push/command channel of the crew backend
//!
//! Inbound events arrive over the backend's Socket.IO endpoint; commands
//! are delivered through the start/stop REST endpoints, so a rejected
//! command comes back as a classified error instead of a later event.

use async_trait::async_trait;
use cd_api_contract::ChannelCommand;
use cd_client_api::{ChannelTransport, ClientApiError, ClientApiResult, EventStream};
use futures::StreamExt;
use url::Url;

use crate::client::RestClient;
use crate::error::RestClientResult;

/// Channel transport backed by a [`RestClient`] and a Socket.IO stream
#[derive(Debug, Clone)]
pub struct BackendChannel {
    client: RestClient,
    socket_url: Url,
}

impl BackendChannel {
    pub fn new(client: RestClient, socket_path: &str) -> RestClientResult<Self> {
        let socket_url = crate::socketio::socket_url(client.base_url(), socket_path)?;
        Ok(Self { client, socket_url })
    }

    pub fn socket_url(&self) -> &Url {
        &self.socket_url
    }
}

#[async_trait]
impl ChannelTransport for BackendChannel {
    async fn subscribe(&self) -> ClientApiResult<EventStream> {
        let stream = crate::socketio::connect(&self.socket_url, self.client.auth()).await?;
        Ok(stream.map(|item| item.map_err(ClientApiError::from)).boxed())
    }

    async fn send(&self, command: &ChannelCommand) -> ClientApiResult<()> {
        tracing::debug!(command = command.name(), crew_id = command.crew_id(), "sending command");
        let ack = match command {
            ChannelCommand::StartCrew { crew_id, inputs } => {
                self.client.start_crew(crew_id, inputs.clone()).await?
            }
            ChannelCommand::StopCrew { crew_id } => self.client.stop_crew(crew_id).await?,
        };
        tracing::debug!(process_id = ?ack.process_id, success = ack.success, "command accepted");
        Ok(())
    }
}
