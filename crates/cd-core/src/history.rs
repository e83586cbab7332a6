//! One-shot fetch of the server's activity backlog
//!
//! The bootstrapper only fetches. Replay, ordering and idempotence are the
//! model's job, so a backlog pushed over the channel and one fetched here go
//! through the same path.

use cd_api_contract::HistoryRecord;
use cd_client_api::{ClientApi, ClientApiResult};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
pub struct HistoryBootstrapper {
    activated: bool,
    cancel: CancellationToken,
}

impl HistoryBootstrapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fetch the backlog on first activation
    ///
    /// Returns `None` when already activated, or when the bootstrapper was
    /// cancelled before the response arrived.
    pub async fn fetch<C: ClientApi + ?Sized>(
        &mut self,
        client: &C,
    ) -> Option<ClientApiResult<Vec<HistoryRecord>>> {
        if self.activated || self.cancel.is_cancelled() {
            return None;
        }
        self.activated = true;

        let cancel = self.cancel.clone();
        let result = tokio::select! {
            _ = cancel.cancelled() => None,
            result = client.activity_history() => Some(result),
        };

        if self.cancel.is_cancelled() {
            debug!("discarding history that resolved after teardown");
            return None;
        }
        result
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that tears the bootstrapper down from another task
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
