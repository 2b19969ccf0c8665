//! Per-run process state model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single process run.
///
/// A run starts with no state at all (`Option::<RunState>::None` on the
/// record) and moves along the edges validated by the run-state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Run created and queued, not yet forked.
    Waiting,
    /// Supervisor has forked; the child has not yet taken over.
    Forked,
    /// Child process is executing.
    Running,
    /// Child exited and the supervisor collected a return code.
    Finished,
    /// Child exited unsuccessfully with a collected return code.
    Failed,
    /// Supervisor stopped the child deliberately.
    Killed,
    /// Supervisor lost track of the child (no exit observed).
    Lost,
}

impl RunState {
    /// Whether this state ends the run. Terminal runs never transition
    /// again; further activity for the process starts a fresh run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Failed | Self::Killed | Self::Lost
        )
    }
}

/// One attempt ("run") of a supervised process, or a proposed update to one.
///
/// Every field is an explicit `Option`: absence is semantically distinct
/// from zero, and each transition requires an exact field set to be present
/// on the update. The same type serves as the stored run record and as the
/// update payload inside a checkpoint record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct ProcessState {
    /// Monotonically increasing per-process sequence number, unique within
    /// a process.
    pub sequence: Option<u64>,
    /// Name of the process this run belongs to.
    pub process: Option<String>,
    /// Current run state; `None` until the first transition lands.
    pub run_state: Option<RunState>,
    /// When the supervisor forked the child. Set at FORKED.
    pub fork_time: Option<DateTime<Utc>>,
    /// Pid of the supervising runner that performed the fork. Set at FORKED.
    pub supervisor_pid: Option<u32>,
    /// When the child began executing. Set at RUNNING.
    pub start_time: Option<DateTime<Utc>>,
    /// Pid of the running child. Set at RUNNING.
    pub pid: Option<u32>,
    /// When the run stopped. Set at FINISHED, FAILED, and KILLED.
    pub stop_time: Option<DateTime<Utc>>,
    /// Exit code collected from the child. Set at FINISHED and FAILED.
    pub return_code: Option<i32>,
}

impl ProcessState {
    /// Seed record for a brand-new run: sequence pinned, everything else
    /// unset so the first transition supplies it.
    #[must_use]
    pub(crate) fn seed(process: &str, sequence: u64) -> Self {
        Self {
            sequence: Some(sequence),
            process: Some(process.to_owned()),
            ..Self::default()
        }
    }

    /// Whether this record has reached a terminal run state. A record with
    /// no run state yet is not terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.run_state.is_some_and(RunState::is_terminal)
    }
}
