//! Messages applied to the model

use cd_api_contract::{ChannelEvent, CrewSummary, HistoryRecord};
use cd_client_api::ClientApiError;

/// Results of REST requests
#[derive(Debug, Clone)]
pub enum NetMsg {
    CatalogLoaded(Vec<CrewSummary>),
    HistoryLoaded(Vec<HistoryRecord>),
    RestError(ClientApiError),
}

/// Everything the reconciler reacts to
#[derive(Debug, Clone)]
pub enum Msg {
    /// Validated event from the push channel
    Channel(ChannelEvent),
    /// Event stream failure or a payload rejected at the boundary
    ChannelError(ClientApiError),
    Net(NetMsg),
}
