//! Checkpoint record union.

use serde::{Deserialize, Serialize};

use super::process::ProcessState;
use super::task::{OutcomeState, RunnerHeader};

/// One append-only log entry describing a single fact about task or
/// process state.
///
/// Exactly one case is populated per record. The externally-tagged serde
/// representation enforces this at the decoding boundary: input with zero
/// or multiple populated cases fails to deserialize and never reaches the
/// dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointRecord {
    /// Initialization of the task stream with the runner's identity.
    RunnerHeader(RunnerHeader),
    /// A named ephemeral port was allocated to the task.
    AllocatedPort {
        /// Name the port was requested under.
        port_name: String,
        /// The allocated port number.
        port: u16,
    },
    /// Task-level outcome changed.
    TaskStateUpdate {
        /// New task outcome.
        state: OutcomeState,
    },
    /// History-level outcome changed for one process.
    HistoryStateUpdate {
        /// Process whose history outcome changed.
        process: String,
        /// New history outcome.
        state: OutcomeState,
    },
    /// Run-state transition on a process.
    ProcessUpdate(ProcessState),
}
