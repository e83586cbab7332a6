//! Debounced draft persistence and capped version history
//!
//! One manager edits one configuration text at a time. Every distinct edit
//! restarts the debounce deadline. When the deadline passes the content is
//! written as the current draft and prepended to the version list. Storage
//! failures are logged and the manager keeps working from memory.

use std::sync::Arc;
use std::time::Duration;

use cd_api_contract::ConfigTarget;
use cd_client_api::ClientApi;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::storage::DraftStorage;

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveStatus {
    #[default]
    Idle,
    Pending,
    Autosaved,
    Restored,
    Saved,
}

impl SaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveStatus::Idle => "idle",
            SaveStatus::Pending => "pending",
            SaveStatus::Autosaved => "autosaved",
            SaveStatus::Restored => "restored",
            SaveStatus::Saved => "saved",
        }
    }
}

impl std::fmt::Display for SaveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the version list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    /// Millisecond timestamp, unique within one list
    pub id: i64,
    pub timestamp: String,
    pub content: String,
    pub preview: String,
}

/// First non-blank line, trimmed and shortened
pub fn preview(content: &str) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();

    if line.chars().count() > PREVIEW_CHARS {
        let mut cut: String = line.chars().take(PREVIEW_CHARS).collect();
        cut.push('…');
        cut
    } else {
        line.to_string()
    }
}

pub fn draft_key(target: &ConfigTarget) -> String {
    format!(
        "crew-config:{}:{}:{}",
        target.crew_id, target.target_type, target.name
    )
}

pub fn versions_key(target: &ConfigTarget) -> String {
    format!("{}:versions", draft_key(target))
}

/// Restartable deadline on the tokio clock
#[derive(Debug, Clone)]
pub struct DebounceTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl DebounceTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// (Re)start the timer, dropping any earlier deadline
    pub fn schedule(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Sleep until the deadline; returns immediately when nothing is scheduled
    pub async fn wait(&self) {
        if let Some(deadline) = self.deadline {
            tokio::time::sleep_until(deadline).await;
        }
    }
}

/// Draft/version manager for one open configuration
///
/// Edits only arm the debounce deadline; nothing runs in the background.
/// The owner drives persistence: await [`run_pending`](Self::run_pending)
/// (it can sit in a `select!` next to other work), call
/// [`flush_if_due`](Self::flush_if_due) from its own tick, or
/// [`flush`](Self::flush) before letting go of the manager. A pending draft
/// that is never driven is never written.
pub struct AutosaveManager<C: ClientApi + ?Sized> {
    client: Arc<C>,
    storage: Arc<dyn DraftStorage>,
    debounce: DebounceTimer,
    version_cap: usize,
    target: Option<ConfigTarget>,
    content: String,
    versions: Vec<VersionSnapshot>,
    status: SaveStatus,
}

impl<C: ClientApi + ?Sized> AutosaveManager<C> {
    pub fn new(client: Arc<C>, storage: Arc<dyn DraftStorage>, config: &CoreConfig) -> Self {
        Self {
            client,
            storage,
            debounce: DebounceTimer::new(config.autosave_debounce()),
            version_cap: config.version_cap,
            target: None,
            content: String::new(),
            versions: Vec::new(),
            status: SaveStatus::Idle,
        }
    }

    pub fn target(&self) -> Option<&ConfigTarget> {
        self.target.as_ref()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn versions(&self) -> &[VersionSnapshot] {
        &self.versions
    }

    pub fn status(&self) -> SaveStatus {
        self.status
    }

    pub fn debounce(&self) -> &DebounceTimer {
        &self.debounce
    }

    /// Open a target: persisted draft first, canonical content otherwise
    ///
    /// A pending draft of the previously open target is flushed first.
    pub async fn open(&mut self, target: ConfigTarget) -> Result<()> {
        self.flush();

        self.versions = self.load_versions(&target);
        let draft = self.storage_get(&draft_key(&target));
        self.target = Some(target.clone());

        match draft {
            Some(draft) => {
                debug!(key = %draft_key(&target), "restored persisted draft");
                self.content = draft;
                self.status = SaveStatus::Restored;
            }
            None => {
                self.content.clear();
                self.status = SaveStatus::Idle;
                self.content = self.client.get_config_text(&target).await?;
            }
        }
        Ok(())
    }

    /// Record an edit; returns false when the content did not change
    pub fn edit(&mut self, content: impl Into<String>) -> bool {
        let content = content.into();
        if content == self.content {
            return false;
        }
        self.content = content;
        if self.target.is_some() {
            self.status = SaveStatus::Pending;
            self.debounce.schedule();
        }
        true
    }

    /// Persist the draft if the debounce deadline has passed
    pub fn flush_if_due(&mut self) -> bool {
        if self.debounce.is_due(Instant::now()) {
            self.persist_draft();
            true
        } else {
            false
        }
    }

    /// Wait out a scheduled debounce and persist
    pub async fn run_pending(&mut self) -> bool {
        if !self.debounce.is_pending() {
            return false;
        }
        self.debounce.wait().await;
        self.flush_if_due()
    }

    /// Persist a pending draft immediately
    pub fn flush(&mut self) -> bool {
        if self.debounce.is_pending() {
            self.persist_draft();
            true
        } else {
            false
        }
    }

    /// Bring back a stored version; it becomes the draft without adding a version
    pub fn restore(&mut self, index: usize) -> Result<()> {
        let version = self
            .versions
            .get(index)
            .ok_or_else(|| CoreError::generic(format!("No version at index {index}")))?;
        let content = version.content.clone();
        let target = self
            .target
            .clone()
            .ok_or_else(|| CoreError::generic("No configuration is open"))?;

        self.debounce.cancel();
        self.storage_set(&draft_key(&target), &content);
        self.content = content;
        self.status = SaveStatus::Restored;
        Ok(())
    }

    /// Drop the draft and its versions, then reload canonical content
    pub async fn clear_drafts(&mut self) -> Result<()> {
        self.debounce.cancel();
        self.versions.clear();
        self.status = SaveStatus::Idle;

        let Some(target) = self.target.clone() else {
            return Ok(());
        };
        self.storage_remove(&draft_key(&target));
        self.storage_remove(&versions_key(&target));
        info!(key = %draft_key(&target), "cleared drafts");

        self.content = self.client.get_config_text(&target).await?;
        Ok(())
    }

    /// Flush, then write the content to the backend
    pub async fn save(&mut self) -> Result<()> {
        let target = self
            .target
            .clone()
            .ok_or_else(|| CoreError::generic("No configuration is open"))?;
        self.flush();

        self.client.save_config_text(&target, &self.content).await?;
        self.status = SaveStatus::Saved;
        info!(crew_id = %target.crew_id, name = %target.name, "configuration saved");
        Ok(())
    }

    fn persist_draft(&mut self) {
        self.debounce.cancel();
        let Some(target) = self.target.clone() else {
            return;
        };

        self.storage_set(&draft_key(&target), &self.content);

        let now = Utc::now();
        let mut id = now.timestamp_millis();
        if let Some(newest) = self.versions.iter().map(|v| v.id).max() {
            id = id.max(newest + 1);
        }
        let snapshot = VersionSnapshot {
            id,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            content: self.content.clone(),
            preview: preview(&self.content),
        };

        self.versions.retain(|v| v.content != snapshot.content);
        self.versions.insert(0, snapshot);
        self.versions.truncate(self.version_cap);

        match serde_json::to_string(&self.versions) {
            Ok(json) => self.storage_set(&versions_key(&target), &json),
            Err(error) => warn!(%error, "failed to encode version list"),
        }

        self.status = SaveStatus::Autosaved;
        debug!(key = %draft_key(&target), versions = self.versions.len(), "draft autosaved");
    }

    fn load_versions(&self, target: &ConfigTarget) -> Vec<VersionSnapshot> {
        let key = versions_key(target);
        let Some(json) = self.storage_get(&key) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<VersionSnapshot>>(&json) {
            Ok(mut versions) => {
                versions.truncate(self.version_cap);
                versions
            }
            Err(error) => {
                warn!(%key, %error, "ignoring malformed version list");
                Vec::new()
            }
        }
    }

    fn storage_get(&self, key: &str) -> Option<String> {
        self.storage.get(key).unwrap_or_else(|error| {
            warn!(key, %error, "draft storage read failed");
            None
        })
    }

    fn storage_set(&self, key: &str, value: &str) {
        if let Err(error) = self.storage.set(key, value) {
            warn!(key, %error, "draft storage write failed");
        }
    }

    fn storage_remove(&self, key: &str) {
        if let Err(error) = self.storage.remove(key) {
            warn!(key, %error, "draft storage delete failed");
        }
    }
}
