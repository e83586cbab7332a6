//! Event reconciler and owner of every store
//!
//! The model applies one message at a time and runs each to completion.
//! Channel events, history replay and REST snapshots all converge here, so
//! the catalog, run-state, log ledger and activity feed never disagree.

use std::collections::HashSet;

use cd_api_contract::*;
use chrono::{DateTime, Utc};
use tracing::{debug, info, trace, warn};

use crate::activity::{ActivityFeed, ActivityItem, ActivityKind};
use crate::catalog::{Catalog, Crew};
use crate::config::CoreConfig;
use crate::dedup::LogDeduplicator;
use crate::error::CoreError;
use crate::logs::{LogEntry, LogLedger, LogLevel};
use crate::msg::{Msg, NetMsg};
use crate::run_state::{RunState, RunStateTracker};

/// Record kinds replayed from the activity backlog
pub const HISTORY_KINDS: [&str; 6] = [
    "crew_log",
    "crew_started",
    "crew_start_ack",
    "crew_stopped",
    "crew_error",
    "stop_requested",
];

/// How an event reached the reconciler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Live,
    History(DateTime<Utc>),
}

impl Origin {
    fn timestamp(self) -> DateTime<Utc> {
        match self {
            Origin::Live => Utc::now(),
            Origin::History(at) => at,
        }
    }
}

pub struct Model {
    config: CoreConfig,
    catalog: Catalog,
    run_state: RunStateTracker,
    logs: LogLedger,
    activity: ActivityFeed,
    dedup: LogDeduplicator,
    seen_history: HashSet<u64>,
    viewed: Option<String>,
    last_error: Option<CoreError>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new(CoreConfig::default())
    }
}

impl Model {
    pub fn new(config: CoreConfig) -> Self {
        Self {
            catalog: Catalog::new(),
            run_state: RunStateTracker::new(),
            logs: LogLedger::new(),
            activity: ActivityFeed::new(config.activity_cap),
            dedup: LogDeduplicator::new(config.dedup_window(), config.dedup_threshold),
            seen_history: HashSet::new(),
            viewed: None,
            last_error: None,
            config,
        }
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn run_state(&self) -> &RunStateTracker {
        &self.run_state
    }

    pub(crate) fn run_state_mut(&mut self) -> &mut RunStateTracker {
        &mut self.run_state
    }

    pub fn state_of(&self, crew_id: &str) -> RunState {
        self.run_state.state(crew_id)
    }

    pub fn logs(&self) -> &LogLedger {
        &self.logs
    }

    pub fn activity(&self) -> &ActivityFeed {
        &self.activity
    }

    pub fn seen_history_len(&self) -> usize {
        self.seen_history.len()
    }

    pub fn viewed(&self) -> Option<&str> {
        self.viewed.as_deref()
    }

    pub fn viewed_crew(&self) -> Option<&Crew> {
        self.viewed.as_deref().and_then(|id| self.catalog.get(id))
    }

    /// Select the crew shown in detail; unknown ids are refused
    pub fn set_viewed(&mut self, crew_id: Option<&str>) -> bool {
        match crew_id {
            Some(id) if !self.catalog.contains(id) => false,
            other => {
                self.viewed = other.map(str::to_string);
                true
            }
        }
    }

    pub fn last_error(&self) -> Option<&CoreError> {
        self.last_error.as_ref()
    }

    pub fn surface_error(&mut self, error: CoreError) {
        warn!(%error, "surfacing error");
        self.last_error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn update(&mut self, msg: Msg) {
        match msg {
            Msg::Channel(event) => self.apply_event(event),
            Msg::ChannelError(error) => {
                if error.is_network() {
                    self.surface_error(error.into());
                } else {
                    warn!(%error, "rejected channel payload");
                }
            }
            Msg::Net(NetMsg::CatalogLoaded(crews)) => self.apply_catalog_snapshot(crews),
            Msg::Net(NetMsg::HistoryLoaded(records)) => {
                self.replay_history(records);
            }
            Msg::Net(NetMsg::RestError(error)) => self.surface_error(error.into()),
        }
    }

    /// Apply one live channel event
    pub fn apply_event(&mut self, event: ChannelEvent) {
        debug!(event = event.name(), "applying channel event");
        match event {
            ChannelEvent::CrewLog(payload) => self.on_log(payload, Origin::Live),
            ChannelEvent::CrewsUpdated(crews) => {
                self.replace_catalog(crews);
                let message = format!("Crew catalog updated ({} crews)", self.catalog.len());
                self.activity.push(ActivityItem::new(
                    ActivityKind::System,
                    LogLevel::Info,
                    message,
                ));
            }
            ChannelEvent::CrewUpdated(summary) => {
                let crew = self.catalog.upsert(summary);
                let item = ActivityItem::new(
                    ActivityKind::Lifecycle,
                    LogLevel::Info,
                    format!("{} updated", crew.name),
                )
                .for_crew(crew.id.clone(), Some(crew.name.clone()))
                .with_meta("status", crew.status.clone());
                self.activity.push(item);
            }
            ChannelEvent::CrewStarted(payload) => self.on_started(payload, Origin::Live),
            ChannelEvent::CrewStartAck(payload) => self.on_start_ack(payload, Origin::Live),
            ChannelEvent::CrewStopped(payload) => self.on_stopped(payload, Origin::Live),
            ChannelEvent::StopRequested(payload) => self.on_stop_requested(payload, Origin::Live),
            ChannelEvent::CrewError(payload) => self.on_crew_error(payload, Origin::Live),
            ChannelEvent::ActivityHistory(records) => {
                self.replay_history(records);
            }
            ChannelEvent::ServerError(payload) => {
                self.activity.push(ActivityItem::new(
                    ActivityKind::System,
                    LogLevel::Error,
                    payload.message.clone(),
                ));
                self.surface_error(CoreError::Server(payload.message));
            }
        }
    }

    /// Merge a REST catalog snapshot; membership follows the snapshot and
    /// run-state is left alone
    pub fn apply_catalog_snapshot(&mut self, crews: Vec<CrewSummary>) {
        debug!(count = crews.len(), "applying catalog snapshot");
        self.replace_catalog(crews);
    }

    /// Replay backlog records once each, in ascending id order
    ///
    /// Returns the number of records applied.
    pub fn replay_history(&mut self, mut records: Vec<HistoryRecord>) -> usize {
        records.sort_by_key(|record| record.id);
        let mut applied = 0;

        for record in records {
            if !self.seen_history.insert(record.id) {
                trace!(id = record.id, "history record already replayed");
                continue;
            }
            if !HISTORY_KINDS.contains(&record.kind.as_str()) {
                debug!(id = record.id, kind = %record.kind, "dropping unrecognized history record");
                continue;
            }

            let event = match ChannelEvent::from_wire(&record.kind, record.data) {
                Ok(event) => event,
                Err(error) => {
                    warn!(id = record.id, %error, "malformed history record");
                    continue;
                }
            };

            let origin = Origin::History(record.timestamp.unwrap_or_else(Utc::now));
            match event {
                ChannelEvent::CrewLog(payload) => self.on_log(payload, origin),
                ChannelEvent::CrewStarted(payload) => self.on_started(payload, origin),
                ChannelEvent::CrewStartAck(payload) => self.on_start_ack(payload, origin),
                ChannelEvent::CrewStopped(payload) => self.on_stopped(payload, origin),
                ChannelEvent::StopRequested(payload) => self.on_stop_requested(payload, origin),
                ChannelEvent::CrewError(payload) => self.on_crew_error(payload, origin),
                _ => continue,
            }
            applied += 1;
        }

        if applied > 0 {
            info!(applied, "replayed activity history");
        }
        applied
    }

    fn replace_catalog(&mut self, crews: Vec<CrewSummary>) {
        self.catalog.replace_all(crews);

        let still_listed = self
            .viewed
            .as_deref()
            .is_some_and(|id| self.catalog.contains(id));
        if !still_listed {
            let next = self.catalog.first().map(|crew| crew.id.clone());
            if next != self.viewed {
                debug!(from = ?self.viewed, to = ?next, "re-pointing viewed crew");
                self.viewed = next;
            }
        }
    }

    fn crew_name(&self, crew_id: &str) -> Option<String> {
        self.catalog.get(crew_id).map(|crew| crew.name.clone())
    }

    fn display_name(&self, crew_id: &str) -> String {
        self.crew_name(crew_id)
            .unwrap_or_else(|| crew_id.to_string())
    }

    fn lifecycle_item(
        &self,
        crew_id: &str,
        level: LogLevel,
        message: String,
        origin: Origin,
    ) -> ActivityItem {
        ActivityItem::new(ActivityKind::Lifecycle, level, message)
            .at(origin.timestamp())
            .for_crew(crew_id, self.crew_name(crew_id))
    }

    fn on_log(&mut self, payload: CrewLogPayload, origin: Origin) {
        let entry = LogEntry::from(payload);

        if entry.is_duplicate {
            if !self.logs.merge_duplicate(&entry) {
                debug!(
                    crew_id = %entry.crew_id,
                    operation_id = ?entry.operation_id,
                    sequence = ?entry.sequence,
                    "duplicate marker without original entry"
                );
            }
            return;
        }

        if origin == Origin::Live && self.dedup.check(&entry.agent, &entry.message) {
            trace!(agent = %entry.agent, "suppressed repeated log line");
            return;
        }

        let mut item = ActivityItem::new(ActivityKind::Log, entry.level, entry.message.clone())
            .at(entry.timestamp)
            .for_crew(entry.crew_id.clone(), self.crew_name(&entry.crew_id))
            .with_meta("agent", entry.agent.clone());
        if let Some(category) = &entry.category {
            item = item.with_meta("category", category.clone());
        }
        self.activity.push(item);
        self.logs.append(entry);
    }

    fn on_started(&mut self, payload: CrewLifecyclePayload, origin: Origin) {
        let id = payload.crew_id.trim();
        self.run_state.confirm_started(id);
        info!(crew_id = id, "crew started");

        let mut item = self.lifecycle_item(
            id,
            LogLevel::Info,
            format!("{} started", self.display_name(id)),
            origin,
        );
        if let Some(process_id) = payload.process_id {
            item = item.with_meta("processId", process_id);
        }
        self.activity.push(item);
    }

    fn on_start_ack(&mut self, payload: CrewLifecyclePayload, origin: Origin) {
        let id = payload.crew_id.trim();
        let mut item = self.lifecycle_item(
            id,
            LogLevel::Info,
            format!("{} start accepted", self.display_name(id)),
            origin,
        );
        if let Some(process_id) = payload.process_id {
            item = item.with_meta("processId", process_id);
        }
        self.activity.push(item);
    }

    fn on_stopped(&mut self, payload: CrewLifecyclePayload, origin: Origin) {
        let id = payload.crew_id.trim();
        self.run_state.confirm_stopped(id);
        info!(crew_id = id, exit_code = ?payload.exit_code, "crew stopped");

        let name = self.display_name(id);
        let (level, message) = match payload.exit_code {
            Some(code) if code != 0 => {
                (LogLevel::Warning, format!("{name} stopped (exit code {code})"))
            }
            _ => (LogLevel::Info, format!("{name} stopped")),
        };
        let mut item = self.lifecycle_item(id, level, message, origin);
        if let Some(code) = payload.exit_code {
            item = item.with_meta("exitCode", code);
        }
        self.activity.push(item);
    }

    fn on_stop_requested(&mut self, payload: CrewLifecyclePayload, origin: Origin) {
        let id = payload.crew_id.trim();
        if self.run_state.acknowledge_stop(id) {
            debug!(crew_id = id, "stop acknowledged by server");
        }
        let item = self.lifecycle_item(
            id,
            LogLevel::Info,
            format!("Stop requested for {}", self.display_name(id)),
            origin,
        );
        self.activity.push(item);
    }

    fn on_crew_error(&mut self, payload: CrewErrorPayload, origin: Origin) {
        let id = payload.crew_id.trim().to_string();
        self.run_state.clear_pending(&id);

        let item = self.lifecycle_item(
            &id,
            LogLevel::Error,
            format!("{} failed: {}", self.display_name(&id), payload.error),
            origin,
        );
        self.activity.push(item);
        self.surface_error(CoreError::runtime_job(id, payload.error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log_payload(crew: &str, agent: &str, message: &str) -> CrewLogPayload {
        CrewLogPayload {
            crew_id: crew.into(),
            agent: agent.into(),
            message: message.into(),
            level: Some("info".into()),
            timestamp: Utc::now(),
            category: None,
            operation_id: None,
            sequence: None,
            is_duplicate: false,
            duplicate_count: None,
            operation_status: None,
            total_steps: None,
        }
    }

    fn model_with(ids: &[&str]) -> Model {
        let mut model = Model::default();
        model.apply_catalog_snapshot(ids.iter().map(|id| CrewSummary::with_id(*id)).collect());
        model
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_log_suppressed_silently() {
        let mut model = model_with(&["j1"]);
        for _ in 0..4 {
            model.apply_event(ChannelEvent::CrewLog(log_payload("j1", "a", "same")));
        }
        assert_eq!(model.logs().logs("j1").len(), 3);
        assert_eq!(model.activity().len(), 3);
    }

    #[test]
    fn test_source_duplicate_updates_in_place() {
        let mut model = model_with(&["j1"]);
        let mut original = log_payload("j1", "a", "step");
        original.operation_id = Some("op".into());
        original.sequence = Some(1);
        model.apply_event(ChannelEvent::CrewLog(original.clone()));

        let mut duplicate = original;
        duplicate.is_duplicate = true;
        duplicate.duplicate_count = Some(2);
        model.apply_event(ChannelEvent::CrewLog(duplicate));

        assert_eq!(model.logs().logs("j1").len(), 1);
        assert_eq!(model.logs().logs("j1")[0].duplicate_count, 2);
        assert_eq!(model.activity().len(), 1);
    }

    #[test]
    fn test_error_clears_pending_and_surfaces() {
        let mut model = model_with(&["j1"]);
        model.run_state_mut().mark_pending_start("j1");

        model.apply_event(ChannelEvent::CrewError(CrewErrorPayload {
            crew_id: "j1".into(),
            error: "boom".into(),
            status: None,
        }));

        assert_eq!(model.state_of("j1"), RunState::Idle);
        assert!(matches!(
            model.last_error(),
            Some(CoreError::RuntimeJob { crew_id, message }) if crew_id == "j1" && message == "boom"
        ));
        let item = model.activity().newest_first().next().unwrap();
        assert_eq!(item.level, LogLevel::Error);
    }

    #[test]
    fn test_catalog_replacement_repoints_viewed() {
        let mut model = model_with(&["a", "b"]);
        assert!(model.set_viewed(Some("b")));

        model.apply_event(ChannelEvent::CrewsUpdated(vec![
            CrewSummary::with_id("c"),
            CrewSummary::with_id("b"),
        ]));
        assert_eq!(model.viewed(), Some("b"));

        model.apply_event(ChannelEvent::CrewsUpdated(vec![CrewSummary::with_id("c")]));
        assert_eq!(model.viewed(), Some("c"));

        model.apply_event(ChannelEvent::CrewsUpdated(vec![]));
        assert_eq!(model.viewed(), None);
        assert_eq!(model.activity().len(), 3);
    }

    #[test]
    fn test_catalog_load_views_first_crew_when_none_viewed() {
        let mut model = Model::default();
        model.apply_catalog_snapshot(vec![]);
        assert_eq!(model.viewed(), None);

        model.apply_event(ChannelEvent::CrewsUpdated(vec![
            CrewSummary::with_id("x"),
            CrewSummary::with_id("y"),
        ]));
        assert_eq!(model.viewed(), Some("x"));

        assert!(model.set_viewed(None));
        model.apply_catalog_snapshot(vec![CrewSummary::with_id("y")]);
        assert_eq!(model.viewed(), Some("y"));
    }

    #[test]
    fn test_snapshot_does_not_touch_run_state_or_activity() {
        let mut model = model_with(&["j1"]);
        model.apply_event(ChannelEvent::CrewStarted(CrewLifecyclePayload::new("j1")));
        let before = model.activity().len();

        model.apply_catalog_snapshot(vec![CrewSummary {
            status: Some("ready".into()),
            ..CrewSummary::with_id("j1")
        }]);

        assert_eq!(model.state_of("j1"), RunState::Running);
        assert_eq!(model.activity().len(), before);
    }

    #[test]
    fn test_stop_requested_marks_running_crew() {
        let mut model = model_with(&["j1", "j2"]);
        model.apply_event(ChannelEvent::CrewStarted(CrewLifecyclePayload::new("j1")));

        model.apply_event(ChannelEvent::StopRequested(CrewLifecyclePayload::new("j1")));
        model.apply_event(ChannelEvent::StopRequested(CrewLifecyclePayload::new("j2")));

        assert_eq!(model.state_of("j1"), RunState::PendingStop);
        assert_eq!(model.state_of("j2"), RunState::Idle);
    }

    #[test]
    fn test_history_replay_idempotent_and_ordered() {
        let mut model = model_with(&["j1"]);
        let at = "2025-03-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let records = vec![
            HistoryRecord {
                id: 2,
                kind: "crew_stopped".into(),
                timestamp: Some(at + chrono::Duration::seconds(5)),
                data: json!({"crew_id": "j1", "exit_code": 0}),
            },
            HistoryRecord {
                id: 1,
                kind: "crew_started".into(),
                timestamp: Some(at),
                data: json!({"crew_id": "j1"}),
            },
            HistoryRecord {
                id: 3,
                kind: "metrics_tick".into(),
                timestamp: None,
                data: json!({}),
            },
        ];

        assert_eq!(model.replay_history(records.clone()), 2);
        assert_eq!(model.replay_history(records), 0);
        assert_eq!(model.state_of("j1"), RunState::Idle);
        assert_eq!(model.activity().len(), 2);
        assert_eq!(model.activity().iter().next().unwrap().timestamp, at);
    }

    #[test]
    fn test_history_logs_bypass_dedup() {
        let mut model = model_with(&["j1"]);
        let records: Vec<_> = (1..=5)
            .map(|id| HistoryRecord {
                id,
                kind: "crew_log".into(),
                timestamp: None,
                data: json!({
                    "crewId": "j1",
                    "agent": "a",
                    "message": "same",
                    "timestamp": "2025-03-01T10:00:00Z"
                }),
            })
            .collect();

        assert_eq!(model.replay_history(records), 5);
        assert_eq!(model.logs().logs("j1").len(), 5);
    }

    #[test]
    fn test_server_error_event() {
        let mut model = Model::default();
        model.apply_event(ChannelEvent::ServerError(ServerErrorPayload {
            message: "Invalid request".into(),
        }));
        assert!(matches!(model.last_error(), Some(CoreError::Server(m)) if m == "Invalid request"));
        assert_eq!(model.activity().len(), 1);
    }

    #[test]
    fn test_contract_rejection_not_surfaced() {
        let mut model = Model::default();
        model.update(Msg::ChannelError(cd_client_api::ClientApiError::Contract(
            "bad".into(),
        )));
        assert!(model.last_error().is_none());
    }
}
