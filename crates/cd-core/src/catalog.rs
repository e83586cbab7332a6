//! Catalog store: the authoritative table of known crews
//!
//! Summaries arriving from the REST catalog or from push events are
//! normalized and overlaid on what is already held, so a partial summary
//! never erases fields it does not mention.

use std::collections::{BTreeMap, HashSet};

use cd_api_contract::{AgentRef, CrewSummary, InputParam, TaskRef};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Status assumed when the server does not report one
pub const DEFAULT_STATUS: &str = "ready";

/// A crew as held by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crew {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub tags: Vec<String>,
    pub agents: Vec<AgentRef>,
    pub tasks: Vec<TaskRef>,
    pub inputs: BTreeMap<String, InputParam>,
    pub extra: Map<String, Value>,
}

impl Crew {
    fn placeholder(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            status: DEFAULT_STATUS.to_string(),
            tags: Vec::new(),
            agents: Vec::new(),
            tasks: Vec::new(),
            inputs: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    /// Overlay `incoming` on `existing` (or on an empty crew)
    pub fn merged(existing: Option<&Crew>, incoming: CrewSummary) -> Crew {
        let id = incoming.id.trim();
        let mut crew = existing
            .cloned()
            .unwrap_or_else(|| Crew::placeholder(id));
        crew.id = id.to_string();

        if let Some(name) = non_blank(incoming.name) {
            crew.name = name;
        }
        if let Some(description) = incoming.description {
            crew.description = Some(description);
        }
        if let Some(status) = non_blank(incoming.status) {
            crew.status = status;
        }
        if let Some(tags) = incoming.tags {
            crew.tags = normalize_tags(tags);
        }
        if let Some(agents) = incoming.agents {
            crew.agents = agents;
        }
        if let Some(tasks) = incoming.tasks {
            crew.tasks = tasks;
        }
        if let Some(inputs) = incoming.inputs {
            crew.inputs = inputs;
        }
        crew.extra.extend(incoming.extra);

        crew
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Trim tags, drop empties and case-insensitive duplicates (first spelling wins)
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty() && seen.insert(tag.to_lowercase()))
        .collect()
}

/// Ordered crew table keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    crews: Vec<Crew>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Crew> {
        self.crews.iter().find(|crew| crew.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Crew> {
        self.crews.iter()
    }

    pub fn first(&self) -> Option<&Crew> {
        self.crews.first()
    }

    pub fn len(&self) -> usize {
        self.crews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crews.is_empty()
    }

    /// Merge one summary, inserting it at the end when new
    pub fn upsert(&mut self, summary: CrewSummary) -> &Crew {
        let id = summary.id.trim().to_string();
        match self.crews.iter().position(|crew| crew.id == id) {
            Some(index) => {
                let merged = Crew::merged(Some(&self.crews[index]), summary);
                self.crews[index] = merged;
                &self.crews[index]
            }
            None => {
                self.crews.push(Crew::merged(None, summary));
                let last = self.crews.len() - 1;
                &self.crews[last]
            }
        }
    }

    /// Replace membership wholesale, keeping held fields of surviving crews
    ///
    /// Crews absent from `summaries` are dropped. A repeated identifier is
    /// overlaid onto its first occurrence.
    pub fn replace_all(&mut self, summaries: Vec<CrewSummary>) {
        let mut next: Vec<Crew> = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let id = summary.id.trim();
            if let Some(index) = next.iter().position(|crew| crew.id == id) {
                let merged = Crew::merged(Some(&next[index]), summary);
                next[index] = merged;
            } else {
                let held = self.get(id);
                next.push(Crew::merged(held, summary));
            }
        }
        self.crews = next;
    }
}
