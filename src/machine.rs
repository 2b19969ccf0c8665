//! Run-state machine for a single process run.
//!
//! Pure validation and merge logic: given the current run record and a
//! proposed update, decide legality and produce the merged record by value.
//! The caller commits the result; nothing here mutates in place, so a
//! rejected update leaves the current record untouched.

use tracing::warn;

use crate::errors::{DispatchError, Result};
use crate::models::process::{ProcessState, RunState};

/// Apply `update` against `current` and return the merged run record.
///
/// Returns `Ok(None)` when the update is a replay of an already-applied
/// sequence number in recovery mode; callers must not fire handlers or
/// touch state in that case.
///
/// Set `recovery` when replaying a checkpoint log after a crash: forked
/// children re-emit their checkpoint segments starting over at low
/// sequence numbers, so duplicate and overlapping sequences are expected
/// there and fatal everywhere else.
///
/// # Errors
///
/// `InvalidSequenceNumber` when the update has no sequence, or its
/// sequence does not advance outside recovery mode.
/// `InvalidStateTransition` when the update has no run state, repeats the
/// current run state, or requests an edge the transition graph forbids.
/// `Recovery` when a field required by the transition is missing on the
/// update or already set on the current record.
pub fn advance(
    current: &ProcessState,
    update: &ProcessState,
    recovery: bool,
) -> Result<Option<ProcessState>> {
    let Some(sequence) = update.sequence else {
        return Err(DispatchError::InvalidSequenceNumber(format!(
            "update without a sequence number: {update:?}"
        )));
    };

    let current_seq = current.sequence.unwrap_or(0);
    if current_seq > 0 {
        if sequence <= current_seq {
            if recovery {
                // Replayed child checkpoint segment; already folded in.
                return Ok(None);
            }
            return Err(DispatchError::InvalidSequenceNumber(format!(
                "out of order sequence number: {current_seq} => {sequence}"
            )));
        }
        // Tolerated while missed intermediate checkpoints remain an
        // operational reality; not hardened into an error.
        if sequence != current_seq + 1 {
            warn!(
                process = current.process.as_deref().unwrap_or("<unnamed>"),
                current = current_seq,
                proposed = sequence,
                "noncontiguous sequence number"
            );
        }
    }

    let Some(next) = update.run_state else {
        return Err(DispatchError::InvalidStateTransition(format!(
            "update without a run state: {update:?}"
        )));
    };
    if current.run_state == Some(next) {
        return Err(DispatchError::InvalidStateTransition(format!(
            "must transition between states, got {next:?} => {next:?}"
        )));
    }
    if !edge_is_legal(current.run_state, next) {
        return Err(DispatchError::InvalidStateTransition(format!(
            "{:?} => {next:?}",
            current.run_state
        )));
    }

    merge(current, update, next).map(Some)
}

/// The legal transition graph. Terminal states have no outgoing edges.
fn edge_is_legal(from: Option<RunState>, to: RunState) -> bool {
    matches!(
        (from, to),
        (None, RunState::Waiting)
            | (Some(RunState::Waiting), RunState::Forked)
            | (Some(RunState::Forked), RunState::Running)
            | (Some(RunState::Running), RunState::Finished | RunState::Failed)
            | (
                Some(RunState::Forked | RunState::Running),
                RunState::Killed | RunState::Lost
            )
    )
}

/// Build the merged record: bookkeeping fields advance on every transition,
/// payload fields are copied exactly once and never overwritten within a
/// run.
fn merge(current: &ProcessState, update: &ProcessState, next: RunState) -> Result<ProcessState> {
    let mut merged = current.clone();
    merged.sequence = update.sequence;
    merged.run_state = Some(next);

    match next {
        RunState::Waiting => {
            merged.process = Some(required(&update.process, "process")?);
        }
        RunState::Forked => {
            must_be_empty(&current.fork_time, "fork_time")?;
            must_be_empty(&current.supervisor_pid, "supervisor_pid")?;
            merged.fork_time = Some(required(&update.fork_time, "fork_time")?);
            merged.supervisor_pid = Some(required(&update.supervisor_pid, "supervisor_pid")?);
        }
        RunState::Running => {
            must_be_empty(&current.start_time, "start_time")?;
            must_be_empty(&current.pid, "pid")?;
            merged.start_time = Some(required(&update.start_time, "start_time")?);
            merged.pid = Some(required(&update.pid, "pid")?);
        }
        RunState::Finished | RunState::Failed => {
            must_be_empty(&current.stop_time, "stop_time")?;
            must_be_empty(&current.return_code, "return_code")?;
            merged.stop_time = Some(required(&update.stop_time, "stop_time")?);
            merged.return_code = Some(required(&update.return_code, "return_code")?);
        }
        RunState::Killed => {
            must_be_empty(&current.stop_time, "stop_time")?;
            merged.stop_time = Some(required(&update.stop_time, "stop_time")?);
        }
        RunState::Lost => {}
    }

    Ok(merged)
}

/// A field the transition must newly supply.
fn required<T: Clone>(field: &Option<T>, name: &str) -> Result<T> {
    field
        .clone()
        .ok_or_else(|| DispatchError::Recovery(format!("missing field {name} on update")))
}

/// A payload field the current run must not have set yet.
fn must_be_empty<T>(field: &Option<T>, name: &str) -> Result<()> {
    if field.is_some() {
        return Err(DispatchError::Recovery(format!(
            "field {name} already set on current run"
        )));
    }
    Ok(())
}
