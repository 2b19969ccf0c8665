//! Checkpoint record dispatch against aggregate task state.
//!
//! The dispatcher classifies each checkpoint record, validates it against
//! the current [`TaskState`], applies it with field-level precision, and
//! fires registered observers. It holds no per-task data beyond the
//! handler registry, so one dispatcher may service many task states
//! sequentially. Most supervisors build an event loop around it.

use std::collections::hash_map::Entry;

use tracing::debug;

use crate::errors::{DispatchError, Result};
use crate::machine;
use crate::models::process::{ProcessState, RunState};
use crate::models::record::CheckpointRecord;
use crate::models::task::{OutcomeState, ProcessHistory, RunnerHeader, TaskState};

pub mod handlers;

pub use handlers::HandlerRegistry;

/// Applies checkpoint records to a [`TaskState`] and notifies observers.
///
/// A record either fully commits or fully rejects: on any error the task
/// state is left exactly as it was before the call.
#[derive(Debug, Default)]
pub struct CheckpointDispatcher {
    handlers: HandlerRegistry,
}

impl CheckpointDispatcher {
    /// Dispatcher with no registered handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for transitions of processes into `run_state`.
    pub fn register_state_handler(
        &mut self,
        run_state: RunState,
        handler: impl FnMut(&ProcessState) + 'static,
    ) {
        self.handlers.on_state(run_state, handler);
    }

    /// Register a callback fired on every process run-state transition,
    /// before any state-specific callback.
    pub fn register_universal_handler(&mut self, handler: impl FnMut(&ProcessState) + 'static) {
        self.handlers.on_any(handler);
    }

    /// Register a callback fired when the runner allocates a named port.
    pub fn register_port_handler(&mut self, handler: impl FnMut(&str, u16) + 'static) {
        self.handlers.on_port(handler);
    }

    /// Apply one checkpoint record to `state`.
    ///
    /// Returns whether the record changed the state. `Ok(false)` marks the
    /// benign no-ops: a port re-bound to the same number, an outcome update
    /// that matches the current outcome, and replayed process updates in
    /// recovery mode.
    ///
    /// Set `recovery` when folding a checkpoint log after a crash, where
    /// re-emitted child checkpoint segments make duplicate and overlapping
    /// sequence numbers expected.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the record is invalid against the
    /// current state; see [`crate::errors`] for the rejection kinds. The
    /// state is unmodified on error.
    pub fn apply(
        &mut self,
        state: &mut TaskState,
        record: &CheckpointRecord,
        recovery: bool,
    ) -> Result<bool> {
        match record {
            CheckpointRecord::RunnerHeader(header) => Self::apply_header(state, header),
            CheckpointRecord::AllocatedPort { port_name, port } => {
                self.apply_port(state, port_name, *port)
            }
            CheckpointRecord::TaskStateUpdate { state: next } => {
                Ok(Self::apply_task_state(state, *next))
            }
            CheckpointRecord::HistoryStateUpdate { process, state: next } => {
                Self::apply_history_state(state, process, *next)
            }
            CheckpointRecord::ProcessUpdate(update) => {
                self.apply_process_update(state, update, recovery)
            }
        }
    }

    /// Whether applying `record` would perform a transition and update
    /// state. Read-only; never fires handlers.
    ///
    /// Only process run-state records can answer true: the process is
    /// unseen, or the proposed sequence is strictly ahead of the current
    /// run's high-water mark.
    #[must_use]
    pub fn would_apply(&self, state: &TaskState, record: &CheckpointRecord) -> bool {
        let CheckpointRecord::ProcessUpdate(update) = record else {
            return false;
        };
        let Some(process) = update.process.as_deref() else {
            return false;
        };
        match state.processes.get(process) {
            None => true,
            Some(history) => {
                let tail_seq = history
                    .current_run()
                    .and_then(|run| run.sequence)
                    .unwrap_or(0);
                update.sequence.is_some_and(|sequence| sequence > tail_seq)
            }
        }
    }

    /// Initialization of the task stream. The header binds once.
    fn apply_header(state: &mut TaskState, header: &RunnerHeader) -> Result<bool> {
        if state.header.is_some() {
            return Err(DispatchError::Recovery(
                "attempting to rebind task with different parameters".to_owned(),
            ));
        }
        debug!(task_id = header.task_id, "initializing runner header");
        state.header = Some(header.clone());
        Ok(true)
    }

    /// Named ephemeral port allocation. Write-once per name; re-binding to
    /// the same port is a harmless no-op.
    fn apply_port(&mut self, state: &mut TaskState, port_name: &str, port: u16) -> Result<bool> {
        match state.ports.get(port_name) {
            Some(existing) if *existing != port => Err(DispatchError::Recovery(format!(
                "port assignment conflicts with earlier assignment: {port_name}"
            ))),
            Some(_) => Ok(false),
            None => {
                debug!(port_name, port, "assigning named port");
                state.ports.insert(port_name.to_owned(), port);
                self.handlers.dispatch_port(port_name, port);
                Ok(true)
            }
        }
    }

    /// Task-level outcome change; overwrite only when it differs.
    fn apply_task_state(state: &mut TaskState, next: OutcomeState) -> bool {
        if state.state == Some(next) {
            return false;
        }
        debug!(from = ?state.state, to = ?next, "flipping task state");
        state.state = Some(next);
        true
    }

    /// History-level outcome change for one process; the process must
    /// already be known.
    fn apply_history_state(state: &mut TaskState, process: &str, next: OutcomeState) -> Result<bool> {
        let history = state.processes.get_mut(process).ok_or_else(|| {
            DispatchError::Recovery(format!("history state update for unknown process {process}"))
        })?;
        if history.state == next {
            return Ok(false);
        }
        debug!(process, from = ?history.state, to = ?next, "flipping process history state");
        history.state = next;
        Ok(true)
    }

    /// Run-state transition on a process, including the aggregate-level
    /// policy for unseen processes and runs that follow a terminal run.
    fn apply_process_update(
        &mut self,
        state: &mut TaskState,
        update: &ProcessState,
        recovery: bool,
    ) -> Result<bool> {
        let Some(process) = update.process.as_deref() else {
            return Err(DispatchError::Recovery(format!(
                "process state update without a process name: {update:?}"
            )));
        };

        match state.processes.entry(process.to_owned()) {
            Entry::Vacant(slot) => {
                // First record for this process. Validate against a fresh
                // seed run; the history is inserted only once the
                // transition is accepted, so a rejected record leaves the
                // process unknown.
                debug!(process, "first checkpoint record for process");
                let seed = ProcessState::seed(process, 0);
                let Some(merged) = machine::advance(&seed, update, recovery)? else {
                    return Ok(false);
                };
                let mut history = ProcessHistory::new(process);
                history.runs.push(merged);
                slot.insert(history);
                if let Some(run_state) = update.run_state {
                    self.handlers.dispatch_transition(run_state, update);
                }
                Ok(true)
            }
            Entry::Occupied(mut slot) => {
                let history = slot.get_mut();
                let Some(tail) = history.runs.last() else {
                    return Err(DispatchError::Recovery(format!(
                        "process {process} has an empty run history"
                    )));
                };

                if tail.is_terminal() {
                    if update.is_terminal() {
                        return Err(DispatchError::Recovery(format!(
                            "received two consecutive terminal process states for {process}"
                        )));
                    }
                    // The tail run is complete; forge a new run announced
                    // by a synthesized WAITING transition at the next
                    // sequence number. The triggering update only signals
                    // that a new run began.
                    let tail_seq = tail.sequence.unwrap_or(0);
                    debug!(process, tail_seq, "terminal to nonterminal, forging new run");
                    let seed = ProcessState::seed(process, tail_seq);
                    let waiting = ProcessState {
                        sequence: Some(tail_seq + 1),
                        process: Some(process.to_owned()),
                        run_state: Some(RunState::Waiting),
                        ..ProcessState::default()
                    };
                    let Some(merged) = machine::advance(&seed, &waiting, recovery)? else {
                        return Ok(false);
                    };
                    history.runs.push(merged);
                    self.handlers.dispatch_transition(RunState::Waiting, &waiting);
                    return Ok(true);
                }

                // The update pertains to the current run.
                let Some(merged) = machine::advance(tail, update, recovery)? else {
                    return Ok(false);
                };
                if let Some(run) = history.runs.last_mut() {
                    *run = merged;
                }
                if let Some(run_state) = update.run_state {
                    self.handlers.dispatch_transition(run_state, update);
                }
                Ok(true)
            }
        }
    }
}
