//! Run-state tracker
//!
//! Three sets per crew identifier: confirmed running, pending start and
//! pending stop. The settled state of a crew is derived from them with
//! pending-stop taking precedence over running, then pending-start.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Settled run state of one crew
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunState {
    Idle,
    PendingStart,
    Running,
    PendingStop,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::PendingStart => "pending-start",
            RunState::Running => "running",
            RunState::PendingStop => "pending-stop",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(RunState::Idle),
            "pending-start" => Ok(RunState::PendingStart),
            "running" => Ok(RunState::Running),
            "pending-stop" => Ok(RunState::PendingStop),
            other => Err(format!("unknown run state '{other}'")),
        }
    }
}

/// Raw membership of one identifier, used to roll back optimistic marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunMarks {
    pub running: bool,
    pub pending_start: bool,
    pub pending_stop: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RunStateTracker {
    running: HashSet<String>,
    pending_start: HashSet<String>,
    pending_stop: HashSet<String>,
}

impl RunStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: &str) -> RunState {
        if self.pending_stop.contains(id) {
            RunState::PendingStop
        } else if self.running.contains(id) {
            RunState::Running
        } else if self.pending_start.contains(id) {
            RunState::PendingStart
        } else {
            RunState::Idle
        }
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running.contains(id)
    }

    pub fn running(&self) -> &HashSet<String> {
        &self.running
    }

    pub fn pending_start(&self) -> &HashSet<String> {
        &self.pending_start
    }

    pub fn pending_stop(&self) -> &HashSet<String> {
        &self.pending_stop
    }

    pub fn marks(&self, id: &str) -> RunMarks {
        RunMarks {
            running: self.running.contains(id),
            pending_start: self.pending_start.contains(id),
            pending_stop: self.pending_stop.contains(id),
        }
    }

    /// Put back marks captured with [`RunStateTracker::marks`]
    pub fn restore(&mut self, id: &str, marks: RunMarks) {
        set_membership(&mut self.running, id, marks.running);
        set_membership(&mut self.pending_start, id, marks.pending_start);
        set_membership(&mut self.pending_stop, id, marks.pending_stop);
    }

    /// Optimistic start; never applied to a running crew
    pub fn mark_pending_start(&mut self, id: &str) {
        if !self.running.contains(id) {
            self.pending_start.insert(id.to_string());
        }
    }

    /// Optimistic stop
    pub fn mark_pending_stop(&mut self, id: &str) {
        self.pending_start.remove(id);
        self.pending_stop.insert(id.to_string());
    }

    /// Server confirmed the crew started
    pub fn confirm_started(&mut self, id: &str) {
        self.pending_start.remove(id);
        self.running.insert(id.to_string());
    }

    /// Server confirmed the crew stopped, with or without a prior stop request
    pub fn confirm_stopped(&mut self, id: &str) {
        self.running.remove(id);
        self.pending_start.remove(id);
        self.pending_stop.remove(id);
    }

    /// A stop was acknowledged by the server; returns whether the mark changed
    pub fn acknowledge_stop(&mut self, id: &str) -> bool {
        self.running.contains(id) && self.pending_stop.insert(id.to_string())
    }

    /// Crew failed: drop both optimistic marks
    pub fn clear_pending(&mut self, id: &str) {
        self.pending_start.remove(id);
        self.pending_stop.remove(id);
    }
}

fn set_membership(set: &mut HashSet<String>, id: &str, member: bool) {
    if member {
        set.insert(id.to_string());
    } else {
        set.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let mut tracker = RunStateTracker::new();
        assert_eq!(tracker.state("j1"), RunState::Idle);

        tracker.mark_pending_start("j1");
        assert_eq!(tracker.state("j1"), RunState::PendingStart);

        tracker.confirm_started("j1");
        assert_eq!(tracker.state("j1"), RunState::Running);
        assert!(tracker.pending_start().is_empty());

        tracker.mark_pending_stop("j1");
        assert_eq!(tracker.state("j1"), RunState::PendingStop);

        tracker.confirm_stopped("j1");
        assert_eq!(tracker.state("j1"), RunState::Idle);
    }

    #[test]
    fn test_error_clears_pending_start() {
        let mut tracker = RunStateTracker::new();
        tracker.mark_pending_start("j1");
        tracker.clear_pending("j1");
        assert_eq!(tracker.state("j1"), RunState::Idle);
        assert!(!tracker.is_running("j1"));
    }

    #[test]
    fn test_stopped_without_stop_request() {
        let mut tracker = RunStateTracker::new();
        tracker.confirm_started("j1");
        tracker.confirm_stopped("j1");
        assert_eq!(tracker.state("j1"), RunState::Idle);
    }

    #[test]
    fn test_pending_start_and_running_exclusive() {
        let mut tracker = RunStateTracker::new();
        tracker.confirm_started("j1");
        tracker.mark_pending_start("j1");
        assert!(tracker.pending_start().is_empty());
    }

    #[test]
    fn test_acknowledge_stop_only_when_running() {
        let mut tracker = RunStateTracker::new();
        assert!(!tracker.acknowledge_stop("j1"));
        tracker.confirm_started("j1");
        assert!(tracker.acknowledge_stop("j1"));
        assert!(!tracker.acknowledge_stop("j1"));
        assert_eq!(tracker.state("j1"), RunState::PendingStop);
    }

    #[test]
    fn test_restore_marks() {
        let mut tracker = RunStateTracker::new();
        let before = tracker.marks("j1");
        tracker.mark_pending_start("j1");
        tracker.restore("j1", before);
        assert_eq!(tracker.state("j1"), RunState::Idle);
    }

    #[test]
    fn test_run_state_parse() {
        assert_eq!("pending-stop".parse::<RunState>(), Ok(RunState::PendingStop));
        assert!("paused".parse::<RunState>().is_err());
    }
}
