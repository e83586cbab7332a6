//! ViewModel layer - derived presentation state
//!
//! The ViewModel is a snapshot of the model shaped for rendering: filtered
//! and sorted crew rows, the filter tokens a view can offer, the activity
//! timeline and the viewed crew with its logs. It never writes back.

use chrono::{DateTime, Utc};

use crate::activity::ActivityItem;
use crate::catalog::Crew;
use crate::filter::{filter_crews, FilterQuery};
use crate::logs::LogEntry;
use crate::model::Model;
use crate::run_state::RunState;

/// Query a view applies to the catalog
pub type ViewQuery = FilterQuery;

#[derive(Debug, Clone, PartialEq)]
pub struct CrewRow {
    pub id: String,
    pub name: String,
    pub status: String,
    pub run_state: RunState,
    pub agent_count: usize,
    pub last_log_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
}

impl CrewRow {
    fn from_crew(crew: &Crew, model: &Model) -> Self {
        Self {
            id: crew.id.clone(),
            name: crew.name.clone(),
            status: crew.status.clone(),
            run_state: model.state_of(&crew.id),
            agent_count: crew.agent_count(),
            last_log_at: model.logs().last(&crew.id).map(|entry| entry.timestamp),
            tags: crew.tags.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    /// Crews passing the query, in display order
    pub rows: Vec<CrewRow>,
    pub status_tokens: Vec<String>,
    pub tag_tokens: Vec<String>,
    /// Activity items, newest first
    pub activity: Vec<ActivityItem>,
    pub viewed: Option<CrewRow>,
    pub viewed_logs: Vec<LogEntry>,
    pub error_message: Option<String>,
    pub total_crews: usize,
    pub running_count: usize,
}

impl ViewModel {
    pub fn build(model: &Model, query: &ViewQuery) -> Self {
        let output = filter_crews(model.catalog(), model.logs(), model.run_state(), query);
        let viewed = model.viewed_crew();

        Self {
            rows: output
                .crews
                .iter()
                .map(|crew| CrewRow::from_crew(crew, model))
                .collect(),
            status_tokens: output.status_tokens.into_iter().collect(),
            tag_tokens: output.tag_tokens.into_iter().collect(),
            activity: model.activity().newest_first().cloned().collect(),
            viewed: viewed.map(|crew| CrewRow::from_crew(crew, model)),
            viewed_logs: viewed
                .map(|crew| model.logs().logs(&crew.id).to_vec())
                .unwrap_or_default(),
            error_message: model.last_error().map(ToString::to_string),
            total_crews: model.catalog().len(),
            running_count: model.run_state().running().len(),
        }
    }

    pub fn row(&self, crew_id: &str) -> Option<&CrewRow> {
        self.rows.iter().find(|row| row.id == crew_id)
    }

    pub fn visible_ids(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.id.as_str()).collect()
    }
}
