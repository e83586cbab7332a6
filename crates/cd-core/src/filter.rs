//! Declarative filter, free-text search and sort over the catalog
//!
//! The engine only reads the catalog, the log ledger and the run-state
//! tracker; it produces a derived view and writes nothing back.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Crew};
use crate::logs::LogLedger;
use crate::run_state::RunStateTracker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Combinator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterField {
    Status,
    Tags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    IncludesAny,
    IncludesAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Condition {
    pub field: FilterField,
    pub operator: FilterOperator,
    pub value: BTreeSet<String>,
}

impl Condition {
    pub fn new<I, S>(field: FilterField, operator: FilterOperator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            field,
            operator,
            value: normalize_values(values),
        }
    }

    /// No values left after normalization
    pub fn is_empty(&self) -> bool {
        self.value.iter().all(|v| v.trim().is_empty())
    }

    fn matches(&self, tokens: &CrewTokens) -> bool {
        let set = match self.field {
            FilterField::Status => &tokens.status,
            FilterField::Tags => &tokens.tags,
        };
        match self.operator {
            FilterOperator::IncludesAny => self.value.iter().any(|v| set.contains(v)),
            FilterOperator::IncludesAll => self.value.iter().all(|v| set.contains(v)),
        }
    }
}

fn normalize_values<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub combinator: Combinator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl FilterConfig {
    pub fn new(combinator: Combinator, conditions: Vec<Condition>) -> Self {
        Self {
            combinator,
            conditions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Lowercased values, conditions sorted by field/operator/value, duplicates
    /// collapsed and conditions without values dropped
    pub fn canonical(&self) -> FilterConfig {
        let mut conditions: Vec<Condition> = self
            .conditions
            .iter()
            .map(|c| Condition::new(c.field, c.operator, &c.value))
            .filter(|c| !c.value.is_empty())
            .collect();
        conditions.sort();
        conditions.dedup();
        FilterConfig {
            combinator: self.combinator,
            conditions,
        }
    }

    pub fn canonical_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.canonical())
    }

    /// Same canonical form
    pub fn equivalent(&self, other: &FilterConfig) -> bool {
        self.canonical() == other.canonical()
    }

    pub fn matches(&self, tokens: &CrewTokens) -> bool {
        evaluate(tokens, self)
    }

    fn referenced(&self, field: FilterField) -> impl Iterator<Item = String> + '_ {
        self.conditions
            .iter()
            .filter(move |c| c.field == field)
            .flat_map(|c| normalize_values(&c.value))
    }
}

/// Derived filter tokens of one crew
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrewTokens {
    pub status: BTreeSet<String>,
    pub tags: BTreeSet<String>,
}

impl CrewTokens {
    pub fn derive(crew: &Crew, logs: &LogLedger, run_state: &RunStateTracker) -> Self {
        let mut status = BTreeSet::new();
        let declared = crew.status.trim().to_lowercase();
        if !declared.is_empty() {
            status.insert(declared);
        }
        if let Some(last) = logs.last(&crew.id) {
            status.insert(last.level.as_str().to_string());
        }
        if run_state.is_running(&crew.id) {
            status.insert("running".to_string());
        }

        Self {
            status,
            tags: normalize_values(&crew.tags),
        }
    }
}

/// Evaluate a filter config against one crew's tokens
///
/// Conditions without values are skipped rather than matched, so they never
/// widen an `or`. A config with nothing left matches every crew.
pub fn evaluate(tokens: &CrewTokens, config: &FilterConfig) -> bool {
    let mut active = config.conditions.iter().filter(|c| !c.is_empty()).peekable();
    if active.peek().is_none() {
        return true;
    }
    match config.combinator {
        Combinator::And => active.all(|c| c.matches(tokens)),
        Combinator::Or => active.any(|c| c.matches(tokens)),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortKey {
    #[default]
    NameAsc,
    NameDesc,
    LastLogAsc,
    LastLogDesc,
    AgentsAsc,
    AgentsDesc,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::NameAsc => "name-asc",
            SortKey::NameDesc => "name-desc",
            SortKey::LastLogAsc => "last-log-asc",
            SortKey::LastLogDesc => "last-log-desc",
            SortKey::AgentsAsc => "agents-asc",
            SortKey::AgentsDesc => "agents-desc",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name-asc" => Ok(SortKey::NameAsc),
            "name-desc" => Ok(SortKey::NameDesc),
            "last-log-asc" => Ok(SortKey::LastLogAsc),
            "last-log-desc" => Ok(SortKey::LastLogDesc),
            "agents-asc" => Ok(SortKey::AgentsAsc),
            "agents-desc" => Ok(SortKey::AgentsDesc),
            other => Err(format!("unknown sort key '{other}'")),
        }
    }
}

/// Search text, filter config and sort order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterQuery {
    pub text: String,
    pub filter: FilterConfig,
    pub sort: SortKey,
}

impl FilterQuery {
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }
}

#[derive(Debug, Clone)]
pub struct FilterOutput<'a> {
    pub crews: Vec<&'a Crew>,
    /// Status tokens across the unfiltered catalog plus those the filter references
    pub status_tokens: BTreeSet<String>,
    /// Tag tokens across the unfiltered catalog plus those the filter references
    pub tag_tokens: BTreeSet<String>,
}

/// Case-insensitive comparison with a case-sensitive tiebreak
pub fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn text_matches(crew: &Crew, tokens: &CrewTokens, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    let hit = |text: &str| text.to_lowercase().contains(needle);

    hit(&crew.name)
        || crew.description.as_deref().is_some_and(hit)
        || crew
            .agents
            .iter()
            .any(|agent| hit(agent.name()) || agent.role().is_some_and(hit))
        || crew
            .tasks
            .iter()
            .any(|task| hit(task.name()) || task.description().is_some_and(hit))
        || tokens.status.iter().any(|t| t.contains(needle))
        || tokens.tags.iter().any(|t| t.contains(needle))
}

pub fn filter_crews<'a>(
    catalog: &'a Catalog,
    logs: &LogLedger,
    run_state: &RunStateTracker,
    query: &FilterQuery,
) -> FilterOutput<'a> {
    let needle = query.text.trim().to_lowercase();
    let filter = query.filter.canonical();
    let mut status_tokens: BTreeSet<String> = query.filter.referenced(FilterField::Status).collect();
    let mut tag_tokens: BTreeSet<String> = query.filter.referenced(FilterField::Tags).collect();

    let mut crews = Vec::new();
    for crew in catalog.iter() {
        let tokens = CrewTokens::derive(crew, logs, run_state);
        status_tokens.extend(tokens.status.iter().cloned());
        tag_tokens.extend(tokens.tags.iter().cloned());

        if evaluate(&tokens, &filter) && text_matches(crew, &tokens, &needle) {
            crews.push(crew);
        }
    }

    crews.sort_by(|a, b| {
        let primary = match query.sort {
            SortKey::NameAsc => compare_names(&a.name, &b.name),
            SortKey::NameDesc => compare_names(&b.name, &a.name),
            SortKey::LastLogAsc => last_log(logs, a).cmp(&last_log(logs, b)),
            SortKey::LastLogDesc => last_log(logs, b).cmp(&last_log(logs, a)),
            SortKey::AgentsAsc => a.agent_count().cmp(&b.agent_count()),
            SortKey::AgentsDesc => b.agent_count().cmp(&a.agent_count()),
        };
        primary
            .then_with(|| compare_names(&a.name, &b.name))
            .then_with(|| a.id.cmp(&b.id))
    });

    FilterOutput {
        crews,
        status_tokens,
        tag_tokens,
    }
}

fn last_log(logs: &LogLedger, crew: &Crew) -> Option<chrono::DateTime<chrono::Utc>> {
    logs.last(&crew.id).map(|entry| entry.timestamp)
}
