//! Local persistence for configuration drafts
//!
//! Storage is best-effort: callers log failures and carry on in memory.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use cd_local_db::{Database, KvStore};

use crate::error::{CoreError, Result};

/// Key/value store holding drafts and version lists
pub trait DraftStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// SQLite-backed storage under the `drafts` scope
#[derive(Debug, Clone)]
pub struct LocalDbStorage {
    db: Database,
}

impl LocalDbStorage {
    pub const SCOPE: &'static str = "drafts";

    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl DraftStorage for LocalDbStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.db.with_connection(|conn| KvStore::new(conn).get(Self::SCOPE, key))?)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        Ok(self
            .db
            .with_connection(|conn| KvStore::new(conn).set(Self::SCOPE, key, Some(value)))?)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.db
            .with_connection(|conn| KvStore::new(conn).delete(Self::SCOPE, key))?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, String>,
    writes: HashMap<String, usize>,
    failing: bool,
}

/// In-memory storage that counts writes per key
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every operation fail until switched back
    pub fn set_failing(&self, failing: bool) {
        self.lock().failing = failing;
    }

    /// Successful writes to `key` so far
    pub fn writes(&self, key: &str) -> usize {
        self.lock().writes.get(key).copied().unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    fn check(state: &MemoryState) -> Result<()> {
        if state.failing {
            Err(CoreError::Storage("storage unavailable".into()))
        } else {
            Ok(())
        }
    }
}

impl DraftStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let state = self.lock();
        Self::check(&state)?;
        Ok(state.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state)?;
        state.entries.insert(key.to_string(), value.to_string());
        *state.writes.entry(key.to_string()).or_default() += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state)?;
        state.entries.remove(key);
        Ok(())
    }
}
