//! Coordinator owning the model and its collaborators
//!
//! The dashboard wires the injected REST client and channel transport to a
//! single [`Model`]. While connected, a pump task forwards channel items into
//! an in-process queue; messages are applied one at a time by the owner of
//! the dashboard, so the model is never touched from two places.

use std::sync::Arc;

use cd_api_contract::ChannelCommand;
use cd_client_api::{ChannelTransport, ClientApi};
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::CoreConfig;
use crate::dispatcher::CommandDispatcher;
use crate::error::{CoreError, Result};
use crate::history::HistoryBootstrapper;
use crate::model::Model;
use crate::msg::{Msg, NetMsg};
use crate::viewmodel::{ViewModel, ViewQuery};

struct Pump {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Dashboard<C: ClientApi + ?Sized, T: ChannelTransport + ?Sized> {
    model: Model,
    client: Arc<C>,
    transport: Arc<T>,
    dispatcher: CommandDispatcher<T>,
    history: HistoryBootstrapper,
    tx: mpsc::UnboundedSender<Msg>,
    rx: mpsc::UnboundedReceiver<Msg>,
    shutdown: CancellationToken,
    pump: Option<Pump>,
}

impl<C: ClientApi + ?Sized, T: ChannelTransport + ?Sized> Dashboard<C, T> {
    pub fn new(client: Arc<C>, transport: Arc<T>, config: CoreConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            model: Model::new(config),
            dispatcher: CommandDispatcher::new(Arc::clone(&transport)),
            client,
            transport,
            history: HistoryBootstrapper::new(),
            tx,
            rx,
            shutdown: CancellationToken::new(),
            pump: None,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut Model {
        &mut self.model
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Token that stops the pump and any waiting [`Dashboard::next_message`]
    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.pump
            .as_ref()
            .is_some_and(|pump| !pump.handle.is_finished())
    }

    /// Subscribe to the channel and start forwarding its items
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }
        self.disconnect();

        let mut stream = self.transport.subscribe().await?;
        let stop = self.shutdown.child_token();
        let tx = self.tx.clone();
        let token = stop.clone();

        let handle = tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = token.cancelled() => break,
                    item = stream.next() => item,
                };
                let msg = match item {
                    Some(Ok(event)) => Msg::Channel(event),
                    Some(Err(error)) => Msg::ChannelError(error),
                    None => {
                        debug!("channel stream ended");
                        break;
                    }
                };
                if tx.send(msg).is_err() {
                    break;
                }
            }
        });

        info!("channel connected");
        self.pump = Some(Pump { stop, handle });
        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.stop.cancel();
            debug!("channel disconnected");
        }
    }

    /// Fetch the REST catalog and merge it; returns the catalog size
    pub async fn load_catalog(&mut self) -> Result<usize> {
        match self.client.list_crews().await {
            Ok(crews) => {
                self.model.update(Msg::Net(NetMsg::CatalogLoaded(crews)));
                Ok(self.model.catalog().len())
            }
            Err(error) => {
                self.model.update(Msg::Net(NetMsg::RestError(error.clone())));
                Err(error.into())
            }
        }
    }

    /// Fetch and replay the activity backlog on first call
    ///
    /// Returns the number of records applied.
    pub async fn load_history(&mut self) -> Result<usize> {
        match self.history.fetch(self.client.as_ref()).await {
            None => Ok(0),
            Some(Ok(records)) => Ok(self.model.replay_history(records)),
            Some(Err(error)) => {
                self.model.update(Msg::Net(NetMsg::RestError(error.clone())));
                Err(error.into())
            }
        }
    }

    pub async fn start(
        &mut self,
        crew_id: &str,
        inputs: &Map<String, Value>,
    ) -> Result<ChannelCommand> {
        self.dispatcher.start(&mut self.model, crew_id, inputs).await
    }

    pub async fn stop(&mut self, crew_id: &str) -> Result<ChannelCommand> {
        self.dispatcher.stop(&mut self.model, crew_id).await
    }

    pub fn set_viewed(&mut self, crew_id: Option<&str>) -> Result<()> {
        if self.model.set_viewed(crew_id) {
            Ok(())
        } else {
            Err(CoreError::UnknownCrew(crew_id.unwrap_or_default().to_string()))
        }
    }

    /// Wait for the next queued message; `None` after shutdown
    pub async fn next_message(&mut self) -> Option<Msg> {
        tokio::select! {
            _ = self.shutdown.cancelled() => None,
            msg = self.rx.recv() => msg,
        }
    }

    pub fn apply(&mut self, msg: Msg) {
        self.model.update(msg);
    }

    /// Apply every message already queued; returns how many were applied
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(msg) = self.rx.try_recv() {
            self.model.update(msg);
            applied += 1;
        }
        applied
    }

    pub fn view(&self, query: &ViewQuery) -> ViewModel {
        ViewModel::build(&self.model, query)
    }

    /// Stop the pump and abandon any history fetch still in flight
    pub fn teardown(&mut self) {
        self.disconnect();
        self.history.cancel();
        self.shutdown.cancel();
    }
}

impl<C: ClientApi + ?Sized, T: ChannelTransport + ?Sized> Drop for Dashboard<C, T> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.history.cancel();
    }
}
