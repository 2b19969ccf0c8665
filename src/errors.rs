//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared result type for dispatch and replay operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Deterministic rejections of a checkpoint record against current state.
///
/// None of these are transient: the same record applied to the same state
/// fails the same way every time.
#[derive(Debug)]
pub enum DispatchError {
    /// State-consistency violation: header rebinding, conflicting port
    /// reassignment, missing or unexpected transition fields, unknown
    /// process in a history update, or two consecutive terminal states.
    Recovery(String),
    /// The run-state graph forbids the requested edge, or the update does
    /// not change the run state.
    InvalidStateTransition(String),
    /// Missing sequence number on an update, or an out-of-order sequence
    /// outside recovery mode.
    InvalidSequenceNumber(String),
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recovery(msg) => write!(f, "error recovering state: {msg}"),
            Self::InvalidStateTransition(msg) => {
                write!(f, "invalid state transition: {msg}")
            }
            Self::InvalidSequenceNumber(msg) => {
                write!(f, "invalid sequence number: {msg}")
            }
        }
    }
}

impl std::error::Error for DispatchError {}
