//! Runtime state coordination for the crewdeck dashboard.
//!
//! This crate keeps a local view of the crew catalog, run states, logs and
//! activity consistent with a backend that pushes events asynchronously,
//! while the user starts and stops crews, filters the catalog and edits
//! crew configuration with debounced autosave.

pub mod activity;
pub mod autosave;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod history;
pub mod inputs;
pub mod logs;
pub mod model;
pub mod msg;
pub mod run_state;
pub mod storage;
pub mod test_runtime;
pub mod viewmodel;

/// Core result type.
pub use error::{CoreError, InputIssue, Result};

/// Core configuration knobs.
pub use config::CoreConfig;

/// Reconciler and the stores it owns.
pub use activity::{ActivityFeed, ActivityItem, ActivityKind};
pub use catalog::{Catalog, Crew};
pub use logs::{LogEntry, LogLedger, LogLevel};
pub use model::Model;
pub use msg::{Msg, NetMsg};
pub use run_state::{RunState, RunStateTracker};

/// Filtering, sorting and the derived view.
pub use filter::{
    Combinator, Condition, FilterConfig, FilterField, FilterOperator, FilterQuery, SortKey,
};
pub use viewmodel::{CrewRow, ViewModel, ViewQuery};

/// Commands, history and the coordinator.
pub use dashboard::Dashboard;
pub use dispatcher::CommandDispatcher;
pub use history::HistoryBootstrapper;

/// Draft persistence.
pub use autosave::{AutosaveManager, SaveStatus, VersionSnapshot};
pub use storage::{DraftStorage, LocalDbStorage, MemoryStorage};

pub use test_runtime::TestRuntime;
