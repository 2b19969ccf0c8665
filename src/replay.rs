//! Log replay: fold an ordered checkpoint record sequence into task state.
//!
//! The record source owns all I/O and framing; replay only requires an
//! ordered, finite, forward-only sequence of already-decoded records.
//! Recovery is all-or-nothing: the first invalid record aborts the fold
//! and no partial state is surfaced.

use tracing::debug;

use crate::dispatcher::CheckpointDispatcher;
use crate::errors::Result;
use crate::models::record::CheckpointRecord;
use crate::models::task::TaskState;

/// Rebuild task state from a checkpoint record sequence.
///
/// Folds the records into a fresh [`TaskState`] through a fresh dispatcher
/// in recovery mode. Use [`recover_with`] instead when registered handlers
/// should observe the replayed transitions.
///
/// # Errors
///
/// Returns the first dispatch error encountered; no valid state could be
/// recovered from the log in that case.
pub fn recover_state<I>(records: I) -> Result<TaskState>
where
    I: IntoIterator<Item = CheckpointRecord>,
{
    let mut dispatcher = CheckpointDispatcher::new();
    recover_with(&mut dispatcher, records)
}

/// Rebuild task state from a checkpoint record sequence through a
/// caller-supplied dispatcher.
///
/// Handlers registered on `dispatcher` fire for every applied record, in
/// log order, which is how a supervisor rebuilds its own bookkeeping while
/// recovering after a crash.
///
/// # Errors
///
/// Returns the first dispatch error encountered; the partially folded
/// state is discarded.
pub fn recover_with<I>(dispatcher: &mut CheckpointDispatcher, records: I) -> Result<TaskState>
where
    I: IntoIterator<Item = CheckpointRecord>,
{
    let mut state = TaskState::new();
    let mut applied = 0_u64;
    let mut seen = 0_u64;

    for record in records {
        seen += 1;
        if dispatcher.apply(&mut state, &record, true)? {
            applied += 1;
        }
    }

    debug!(seen, applied, "checkpoint replay complete");
    Ok(state)
}
