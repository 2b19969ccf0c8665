//! Checkpoint-log state reconstruction core for a supervised-task process
//! runner.
//!
//! A supervisor appends checkpoint records describing task and process
//! facts to a log; this crate validates each record against everything
//! observed so far, folds it into an in-memory [`TaskState`], and notifies
//! registered observers of the resulting transitions. The same dispatch
//! path serves live event processing (strict sequence ordering) and
//! crash-recovery replay (tolerant of re-emitted child checkpoint
//! segments).

#![forbid(unsafe_code)]

pub mod dispatcher;
pub mod errors;
pub mod machine;
pub mod models;
pub mod replay;

pub use dispatcher::{CheckpointDispatcher, HandlerRegistry};
pub use errors::{DispatchError, Result};
pub use models::{
    CheckpointRecord, OutcomeState, ProcessHistory, ProcessState, RunState, RunnerHeader,
    TaskState,
};
pub use replay::{recover_state, recover_with};
