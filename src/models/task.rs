//! Aggregate task state model.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::process::ProcessState;

/// Cross-run outcome classification, used both for a process history and
/// for the task as a whole. Distinct from a single run's run state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeState {
    /// Still has work in flight.
    Active,
    /// Concluded successfully.
    Success,
    /// Concluded unsuccessfully.
    Failed,
}

/// Identity of the runner that produced a checkpoint stream, recorded once
/// at the head of the stream and immutable afterward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct RunnerHeader {
    /// Task identifier the runner was launched for.
    pub task_id: String,
    /// When the runner launched.
    pub launch_time: Option<DateTime<Utc>>,
    /// Sandbox directory the task executes in.
    pub sandbox: Option<String>,
    /// Host the runner executes on.
    pub hostname: Option<String>,
    /// User the task runs as.
    pub user: Option<String>,
}

impl RunnerHeader {
    /// Construct a header with only the task identity set.
    #[must_use]
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            launch_time: None,
            sandbox: None,
            hostname: None,
            user: None,
        }
    }
}

/// All runs of one named process, append-only.
///
/// The last element of `runs` is the current run. At most one non-terminal
/// run may exist, at the tail; a new run is appended only once the previous
/// tail reached a terminal run state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProcessHistory {
    /// Process name.
    pub process: String,
    /// Ordered run records; earlier runs are immutable once superseded.
    pub runs: Vec<ProcessState>,
    /// History-level outcome across runs.
    pub state: OutcomeState,
}

impl ProcessHistory {
    /// Fresh history for a process that was just seen for the first time.
    #[must_use]
    pub fn new(process: impl Into<String>) -> Self {
        Self {
            process: process.into(),
            runs: Vec::new(),
            state: OutcomeState::Active,
        }
    }

    /// The current (tail) run, if any run has been recorded.
    #[must_use]
    pub fn current_run(&self) -> Option<&ProcessState> {
        self.runs.last()
    }
}

/// The authoritative in-memory state of a supervised task, rebuilt by
/// folding checkpoint records.
///
/// Created empty, populated monotonically, never rolled back. Exclusively
/// owned by whichever component folds the checkpoint stream; the dispatcher
/// holds no reference to it across calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TaskState {
    /// Runner identity; write-once.
    pub header: Option<RunnerHeader>,
    /// Named ephemeral ports allocated to the task; write-once per name.
    pub ports: HashMap<String, u16>,
    /// Per-process run histories.
    pub processes: HashMap<String, ProcessHistory>,
    /// Overall task outcome.
    pub state: Option<OutcomeState>,
}

impl TaskState {
    /// Empty state, ready to fold a checkpoint stream into.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
