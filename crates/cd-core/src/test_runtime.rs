//! Test runtime for deterministic scenario execution
//!
//! Drives a [`Dashboard`] and an [`AutosaveManager`] against the scripted
//! backend, one scenario step at a time. Time only moves on `advanceMs`, so
//! scenarios must run on a paused tokio clock.

use std::sync::Arc;

use cd_rest_client_mock::{MockChannel, MockClient};
use cd_test_scenarios::{Scenario, Step};
use tokio::time;
use tracing::debug;

use crate::autosave::{draft_key, AutosaveManager};
use crate::config::CoreConfig;
use crate::dashboard::Dashboard;
use crate::filter::{FilterConfig, FilterQuery, SortKey};
use crate::run_state::RunState;
use crate::storage::{DraftStorage, MemoryStorage};

pub struct TestRuntime {
    dashboard: Dashboard<MockClient, MockChannel>,
    editor: AutosaveManager<MockClient>,
    client: Arc<MockClient>,
    channel: Arc<MockChannel>,
    storage: Arc<MemoryStorage>,
    /// Last command error returned to the caller rather than surfaced
    last_failure: Option<String>,
}

impl TestRuntime {
    pub fn new(scenario: &Scenario) -> Self {
        Self::with_config(scenario, CoreConfig::default())
    }

    pub fn with_config(scenario: &Scenario, config: CoreConfig) -> Self {
        let client = Arc::new(MockClient::from_scenario(scenario));
        let channel = Arc::new(MockChannel::new());
        let storage = Arc::new(MemoryStorage::new());
        let drafts: Arc<dyn DraftStorage> = storage.clone();

        Self {
            editor: AutosaveManager::new(client.clone(), drafts, &config),
            dashboard: Dashboard::new(client.clone(), channel.clone(), config),
            client,
            channel,
            storage,
            last_failure: None,
        }
    }

    pub fn dashboard(&self) -> &Dashboard<MockClient, MockChannel> {
        &self.dashboard
    }

    pub fn editor(&self) -> &AutosaveManager<MockClient> {
        &self.editor
    }

    pub fn client(&self) -> &MockClient {
        &self.client
    }

    pub fn channel(&self) -> &MockChannel {
        &self.channel
    }

    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }

    /// Connect the channel, then execute every step in order
    pub async fn run(&mut self, scenario: &Scenario) -> Result<(), String> {
        self.ensure_connected().await?;
        for (index, step) in scenario.steps.iter().enumerate() {
            self.execute_step(step)
                .await
                .map_err(|err| format!("{}: step {} failed: {}", scenario.name, index + 1, err))?;
        }
        Ok(())
    }

    /// Execute a single step from the scenario
    pub async fn execute_step(&mut self, step: &Step) -> Result<(), String> {
        debug!(?step, "executing scenario step");
        match step {
            Step::AdvanceMs { ms } => {
                time::advance(time::Duration::from_millis(*ms)).await;
                self.editor.flush_if_due();
                self.dashboard.drain();
            }
            Step::LoadCatalog => {
                let result = self.dashboard.load_catalog().await;
                self.record(result.map(|_| ()));
            }
            Step::LoadHistory => {
                let result = self.dashboard.load_history().await;
                self.record(result.map(|_| ()));
            }
            Step::Event { event } => {
                self.ensure_connected().await?;
                self.channel.push_event(event.clone());
                self.deliver().await?;
            }
            Step::RawEvent { name, data } => {
                self.ensure_connected().await?;
                self.channel.push_raw(name, data.clone());
                self.deliver().await?;
            }
            Step::Start { crew_id, inputs } => {
                let result = self.dashboard.start(crew_id, inputs).await;
                self.record(result.map(|_| ()));
            }
            Step::Stop { crew_id } => {
                let result = self.dashboard.stop(crew_id).await;
                self.record(result.map(|_| ()));
            }
            Step::View { crew_id } => {
                self.dashboard
                    .set_viewed(Some(crew_id.as_str()))
                    .map_err(|err| err.to_string())?;
            }
            Step::OpenConfig { target } => {
                self.editor
                    .open(target.clone())
                    .await
                    .map_err(|err| err.to_string())?;
            }
            Step::Edit { content } => {
                self.editor.edit(content.clone());
            }
            Step::RestoreVersion { index } => {
                self.editor.restore(*index).map_err(|err| err.to_string())?;
            }
            Step::ClearDrafts => {
                self.editor
                    .clear_drafts()
                    .await
                    .map_err(|err| err.to_string())?;
            }
            Step::SaveConfig => {
                let result = self.editor.save().await;
                self.record(result);
            }
            Step::AssertRunState { crew_id, state } => {
                let expected: RunState = state.parse()?;
                let actual = self.dashboard.model().state_of(crew_id);
                if actual != expected {
                    return Err(format!(
                        "Run state of '{}': expected {}, got {}",
                        crew_id, expected, actual
                    ));
                }
            }
            Step::AssertCommands { commands } => {
                let sent = self.channel.sent();
                if &sent != commands {
                    return Err(format!("Commands: expected {:?}, got {:?}", commands, sent));
                }
            }
            Step::AssertActivityLen { len } => {
                let actual = self.dashboard.model().activity().len();
                if actual != *len {
                    return Err(format!("Activity length: expected {}, got {}", len, actual));
                }
            }
            Step::AssertLogCount { crew_id, count } => {
                let actual = self.dashboard.model().logs().logs(crew_id).len();
                if actual != *count {
                    return Err(format!(
                        "Log count of '{}': expected {}, got {}",
                        crew_id, count, actual
                    ));
                }
            }
            Step::AssertError { contains } => self.assert_error(contains.as_deref())?,
            Step::AssertVisible {
                query,
                filter,
                sort,
                ids,
            } => {
                let mut view_query = FilterQuery::default().with_text(query.clone());
                if let Some(filter) = filter {
                    let filter: FilterConfig = serde_json::from_value(filter.clone())
                        .map_err(|err| format!("Invalid filter: {}", err))?;
                    view_query = view_query.with_filter(filter);
                }
                if let Some(sort) = sort {
                    view_query = view_query.with_sort(sort.parse::<SortKey>()?);
                }

                let vm = self.dashboard.view(&view_query);
                let visible = vm.visible_ids();
                if visible != ids.iter().map(String::as_str).collect::<Vec<_>>() {
                    return Err(format!("Visible crews: expected {:?}, got {:?}", ids, visible));
                }
            }
            Step::AssertViewed { crew_id } => {
                let actual = self.dashboard.model().viewed();
                if actual != crew_id.as_deref() {
                    return Err(format!("Viewed crew: expected {:?}, got {:?}", crew_id, actual));
                }
            }
            Step::AssertEditor {
                content,
                status,
                versions,
            } => {
                if let Some(content) = content {
                    if self.editor.content() != content {
                        return Err(format!(
                            "Editor content: expected {:?}, got {:?}",
                            content,
                            self.editor.content()
                        ));
                    }
                }
                if let Some(status) = status {
                    if self.editor.status().as_str() != status {
                        return Err(format!(
                            "Editor status: expected {}, got {}",
                            status,
                            self.editor.status()
                        ));
                    }
                }
                if let Some(versions) = versions {
                    let actual = self.editor.versions().len();
                    if actual != *versions {
                        return Err(format!("Versions: expected {}, got {}", versions, actual));
                    }
                }
            }
            Step::AssertDraftWrites { count } => {
                let target = self
                    .editor
                    .target()
                    .ok_or_else(|| "No configuration is open".to_string())?;
                let actual = self.storage.writes(&draft_key(target));
                if actual != *count {
                    return Err(format!("Draft writes: expected {}, got {}", count, actual));
                }
            }
        }
        Ok(())
    }

    async fn ensure_connected(&mut self) -> Result<(), String> {
        if self.dashboard.is_connected() {
            return Ok(());
        }
        self.dashboard.connect().await.map_err(|err| err.to_string())
    }

    /// Apply the next message forwarded by the channel pump
    async fn deliver(&mut self) -> Result<(), String> {
        let msg = self
            .dashboard
            .next_message()
            .await
            .ok_or_else(|| "Channel closed before the event arrived".to_string())?;
        self.dashboard.apply(msg);
        Ok(())
    }

    fn record(&mut self, result: crate::error::Result<()>) {
        self.last_failure = result.err().map(|err| err.to_string());
    }

    fn assert_error(&self, contains: Option<&str>) -> Result<(), String> {
        let surfaced = self
            .dashboard
            .model()
            .last_error()
            .map(ToString::to_string)
            .or_else(|| self.last_failure.clone());

        match (contains, surfaced) {
            (None, None) => Ok(()),
            (None, Some(actual)) => Err(format!("Expected no error, got '{}'", actual)),
            (Some(expected), None) => Err(format!("Expected error containing '{}'", expected)),
            (Some(expected), Some(actual)) if actual.contains(expected) => Ok(()),
            (Some(expected), Some(actual)) => Err(format!(
                "Expected error containing '{}', got '{}'",
                expected, actual
            )),
        }
    }
}
