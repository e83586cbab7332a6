//! Scripted backend used by tests and scenarios
//!
//! [`MockClient`] serves a fixed catalog, history backlog and configuration
//! texts, and records what was written back. [`MockChannel`] records emitted
//! commands and lets tests push events into a subscribed stream.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use cd_api_contract::*;
use cd_client_api::{ChannelTransport, ClientApi, ClientApiError, ClientApiResult, EventStream};
use cd_test_scenarios::Scenario;
use futures::channel::mpsc;
use futures::StreamExt;
use serde_json::Value;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct ClientState {
    crews: Vec<CrewSummary>,
    history: Vec<HistoryRecord>,
    contents: HashMap<ConfigTarget, String>,
    env_files: HashMap<String, Vec<String>>,
    saved: Vec<(ConfigTarget, String)>,
    content_fetches: usize,
    history_fetches: usize,
    history_delay: Option<Duration>,
    failure: Option<ClientApiError>,
}

/// Scripted [`ClientApi`]
#[derive(Default)]
pub struct MockClient {
    state: Mutex<ClientState>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed catalog, history and texts from a scenario
    pub fn from_scenario(scenario: &Scenario) -> Self {
        let client = Self::new()
            .with_crews(scenario.crews.clone())
            .with_history(scenario.history.clone());
        for entry in &scenario.contents {
            client.set_content(entry.target.clone(), entry.content.clone());
        }
        client
    }

    pub fn with_crews(self, crews: Vec<CrewSummary>) -> Self {
        lock(&self.state).crews = crews;
        self
    }

    pub fn with_history(self, history: Vec<HistoryRecord>) -> Self {
        lock(&self.state).history = history;
        self
    }

    pub fn with_content(self, target: ConfigTarget, content: impl Into<String>) -> Self {
        self.set_content(target, content);
        self
    }

    pub fn with_env_files(self, crew_id: impl Into<String>, files: Vec<String>) -> Self {
        lock(&self.state).env_files.insert(crew_id.into(), files);
        self
    }

    /// Delay the history response, for cancellation tests
    pub fn with_history_delay(self, delay: Duration) -> Self {
        lock(&self.state).history_delay = Some(delay);
        self
    }

    pub fn set_crews(&self, crews: Vec<CrewSummary>) {
        lock(&self.state).crews = crews;
    }

    pub fn set_content(&self, target: ConfigTarget, content: impl Into<String>) {
        lock(&self.state).contents.insert(target, content.into());
    }

    /// Make every subsequent request fail with `error`; `None` restores success
    pub fn fail_with(&self, error: Option<ClientApiError>) {
        lock(&self.state).failure = error;
    }

    /// Texts written through `save_config_text`, oldest first
    pub fn saved(&self) -> Vec<(ConfigTarget, String)> {
        lock(&self.state).saved.clone()
    }

    pub fn content_fetches(&self) -> usize {
        lock(&self.state).content_fetches
    }

    pub fn history_fetches(&self) -> usize {
        lock(&self.state).history_fetches
    }

    fn check_failure(&self) -> ClientApiResult<()> {
        match &lock(&self.state).failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ClientApi for MockClient {
    async fn list_crews(&self) -> ClientApiResult<Vec<CrewSummary>> {
        self.check_failure()?;
        Ok(lock(&self.state).crews.clone())
    }

    async fn activity_history(&self) -> ClientApiResult<Vec<HistoryRecord>> {
        let delay = {
            let mut state = lock(&self.state);
            state.history_fetches += 1;
            state.history_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure()?;
        Ok(lock(&self.state).history.clone())
    }

    async fn get_config_text(&self, target: &ConfigTarget) -> ClientApiResult<String> {
        self.check_failure()?;
        let mut state = lock(&self.state);
        state.content_fetches += 1;
        state.contents.get(target).cloned().ok_or_else(|| {
            ClientApiError::Application(format!(
                "{} file '{}' not found for crew {}",
                target.target_type, target.name, target.crew_id
            ))
        })
    }

    async fn save_config_text(
        &self,
        target: &ConfigTarget,
        content: &str,
    ) -> ClientApiResult<()> {
        self.check_failure()?;
        let mut state = lock(&self.state);
        state.contents.insert(target.clone(), content.to_string());
        state.saved.push((target.clone(), content.to_string()));
        Ok(())
    }

    async fn list_env_files(&self, crew_id: &str) -> ClientApiResult<Vec<String>> {
        self.check_failure()?;
        Ok(lock(&self.state)
            .env_files
            .get(crew_id)
            .cloned()
            .unwrap_or_default())
    }
}

type Inbound = ClientApiResult<ChannelEvent>;

#[derive(Default)]
struct ChannelState {
    sender: Option<mpsc::UnboundedSender<Inbound>>,
    pending: Vec<Inbound>,
    sent: Vec<ChannelCommand>,
    send_failure: Option<ClientApiError>,
    subscriptions: usize,
}

/// Scripted [`ChannelTransport`]
#[derive(Default)]
pub struct MockChannel {
    state: Mutex<ChannelState>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for the current (or next) subscriber
    pub fn push_event(&self, event: ChannelEvent) {
        self.push(Ok(event));
    }

    /// Queue a raw payload as it would arrive off the wire
    pub fn push_raw(&self, name: &str, data: Value) {
        self.push(ChannelEvent::from_wire(name, data).map_err(ClientApiError::from));
    }

    pub fn push_error(&self, error: ClientApiError) {
        self.push(Err(error));
    }

    fn push(&self, item: Inbound) {
        let mut state = lock(&self.state);
        if let Some(sender) = state.sender.as_ref().filter(|s| !s.is_closed()) {
            let _ = sender.unbounded_send(item);
            return;
        }
        state.pending.push(item);
    }

    /// End the current subscriber's stream
    pub fn close(&self) {
        lock(&self.state).sender = None;
    }

    /// Make sends fail with `error`; `None` restores success
    pub fn fail_sends(&self, error: Option<ClientApiError>) {
        lock(&self.state).send_failure = error;
    }

    /// Commands accepted so far, oldest first
    pub fn sent(&self) -> Vec<ChannelCommand> {
        lock(&self.state).sent.clone()
    }

    pub fn subscriptions(&self) -> usize {
        lock(&self.state).subscriptions
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.state)
            .sender
            .as_ref()
            .is_some_and(|sender| !sender.is_closed())
    }
}

#[async_trait]
impl ChannelTransport for MockChannel {
    async fn subscribe(&self) -> ClientApiResult<EventStream> {
        let (sender, receiver) = mpsc::unbounded();
        let mut state = lock(&self.state);
        for item in state.pending.drain(..) {
            let _ = sender.unbounded_send(item);
        }
        state.sender = Some(sender);
        state.subscriptions += 1;
        Ok(receiver.boxed())
    }

    async fn send(&self, command: &ChannelCommand) -> ClientApiResult<()> {
        let mut state = lock(&self.state);
        if let Some(err) = &state.send_failure {
            return Err(err.clone());
        }
        state.sent.push(command.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pending_events_delivered_on_subscribe() {
        let channel = MockChannel::new();
        channel.push_event(ChannelEvent::CrewStarted(CrewLifecyclePayload::new("j1")));

        let mut stream = channel.subscribe().await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.name(), "crew_started");

        channel.push_raw("crew_stopped", json!({"crew_id": ""}));
        assert!(stream.next().await.unwrap().is_err());

        channel.close();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_send_records_and_fails_on_demand() {
        let channel = MockChannel::new();
        let stop = ChannelCommand::StopCrew {
            crew_id: "j1".into(),
        };
        channel.send(&stop).await.unwrap();

        channel.fail_sends(Some(ClientApiError::network("http://x", "down")));
        assert!(channel.send(&stop).await.is_err());
        assert_eq!(channel.sent(), vec![stop]);
    }

    #[tokio::test]
    async fn test_client_records_saves() {
        let target = ConfigTarget::yaml("j1", "agents");
        let client = MockClient::new().with_content(target.clone(), "a: 1");

        assert_eq!(client.get_config_text(&target).await.unwrap(), "a: 1");
        client.save_config_text(&target, "a: 2").await.unwrap();
        assert_eq!(client.get_config_text(&target).await.unwrap(), "a: 2");
        assert_eq!(client.saved(), vec![(target, "a: 2".to_string())]);
        assert_eq!(client.content_fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_history() {
        let client = MockClient::new()
            .with_history_delay(Duration::from_millis(500))
            .with_history(vec![HistoryRecord {
                id: 1,
                kind: "crew_started".into(),
                timestamp: None,
                data: json!({"crew_id": "j1"}),
            }]);

        let history = client.activity_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(client.history_fetches(), 1);
    }
}
