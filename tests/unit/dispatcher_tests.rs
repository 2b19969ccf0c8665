//! Unit tests for checkpoint record dispatch.

use chrono::Utc;
use statefold::models::{CheckpointRecord, OutcomeState, ProcessState, RunState, RunnerHeader};
use statefold::{CheckpointDispatcher, DispatchError, TaskState};

fn waiting(process: &str, seq: u64) -> CheckpointRecord {
    CheckpointRecord::ProcessUpdate(ProcessState {
        sequence: Some(seq),
        process: Some(process.into()),
        run_state: Some(RunState::Waiting),
        ..ProcessState::default()
    })
}

fn forked(process: &str, seq: u64) -> CheckpointRecord {
    CheckpointRecord::ProcessUpdate(ProcessState {
        sequence: Some(seq),
        process: Some(process.into()),
        run_state: Some(RunState::Forked),
        fork_time: Some(Utc::now()),
        supervisor_pid: Some(100),
        ..ProcessState::default()
    })
}

fn running(process: &str, seq: u64) -> CheckpointRecord {
    CheckpointRecord::ProcessUpdate(ProcessState {
        sequence: Some(seq),
        process: Some(process.into()),
        run_state: Some(RunState::Running),
        start_time: Some(Utc::now()),
        pid: Some(200),
        ..ProcessState::default()
    })
}

fn killed(process: &str, seq: u64) -> CheckpointRecord {
    CheckpointRecord::ProcessUpdate(ProcessState {
        sequence: Some(seq),
        process: Some(process.into()),
        run_state: Some(RunState::Killed),
        stop_time: Some(Utc::now()),
        ..ProcessState::default()
    })
}

fn finished(process: &str, seq: u64, code: i32) -> CheckpointRecord {
    CheckpointRecord::ProcessUpdate(ProcessState {
        sequence: Some(seq),
        process: Some(process.into()),
        run_state: Some(RunState::Finished),
        stop_time: Some(Utc::now()),
        return_code: Some(code),
        ..ProcessState::default()
    })
}

// ── Header ───────────────────────────────────────────

#[test]
fn header_binds_once() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    let record = CheckpointRecord::RunnerHeader(RunnerHeader::new("task-1"));

    let applied = dispatcher.apply(&mut state, &record, false).expect("apply");
    assert!(applied);
    assert_eq!(
        state.header.as_ref().map(|h| h.task_id.as_str()),
        Some("task-1")
    );
}

#[test]
fn header_rebinding_is_rejected() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    let record = CheckpointRecord::RunnerHeader(RunnerHeader::new("task-1"));

    dispatcher.apply(&mut state, &record, false).expect("first");
    // Even an identical header may not bind twice.
    let result = dispatcher.apply(&mut state, &record, false);
    assert!(matches!(result, Err(DispatchError::Recovery(_))));
}

// ── Port allocation ──────────────────────────────────

#[test]
fn new_port_is_recorded() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    let record = CheckpointRecord::AllocatedPort {
        port_name: "http".into(),
        port: 8080,
    };

    let applied = dispatcher.apply(&mut state, &record, false).expect("apply");
    assert!(applied);
    assert_eq!(state.ports.get("http"), Some(&8080));
}

#[test]
fn rebinding_port_to_same_number_is_a_noop() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    let record = CheckpointRecord::AllocatedPort {
        port_name: "http".into(),
        port: 8080,
    };

    dispatcher.apply(&mut state, &record, false).expect("first");
    let applied = dispatcher.apply(&mut state, &record, false).expect("second");
    assert!(!applied);
    assert_eq!(state.ports.len(), 1);
}

#[test]
fn rebinding_port_to_different_number_is_rejected() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();

    let first = CheckpointRecord::AllocatedPort {
        port_name: "http".into(),
        port: 8080,
    };
    let conflicting = CheckpointRecord::AllocatedPort {
        port_name: "http".into(),
        port: 9090,
    };

    dispatcher.apply(&mut state, &first, false).expect("first");
    let result = dispatcher.apply(&mut state, &conflicting, false);
    assert!(matches!(result, Err(DispatchError::Recovery(_))));
    // The original assignment survives.
    assert_eq!(state.ports.get("http"), Some(&8080));
}

// ── Task and history outcome ─────────────────────────

#[test]
fn task_state_overwrites_only_when_different() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    let active = CheckpointRecord::TaskStateUpdate {
        state: OutcomeState::Active,
    };

    assert!(dispatcher.apply(&mut state, &active, false).expect("first"));
    assert!(!dispatcher.apply(&mut state, &active, false).expect("repeat"));

    let success = CheckpointRecord::TaskStateUpdate {
        state: OutcomeState::Success,
    };
    assert!(dispatcher.apply(&mut state, &success, false).expect("flip"));
    assert_eq!(state.state, Some(OutcomeState::Success));
}

#[test]
fn history_state_update_for_known_process() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    dispatcher
        .apply(&mut state, &waiting("web", 0), false)
        .expect("seed process");

    let record = CheckpointRecord::HistoryStateUpdate {
        process: "web".into(),
        state: OutcomeState::Failed,
    };
    assert!(dispatcher.apply(&mut state, &record, false).expect("flip"));
    assert!(!dispatcher.apply(&mut state, &record, false).expect("repeat"));
    assert_eq!(
        state.processes.get("web").map(|h| h.state),
        Some(OutcomeState::Failed)
    );
}

#[test]
fn history_state_update_for_unknown_process_is_rejected() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();

    let record = CheckpointRecord::HistoryStateUpdate {
        process: "ghost".into(),
        state: OutcomeState::Failed,
    };
    let result = dispatcher.apply(&mut state, &record, false);
    assert!(matches!(result, Err(DispatchError::Recovery(_))));
}

// ── Process run-state updates ────────────────────────

#[test]
fn first_waiting_record_creates_history() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();

    let applied = dispatcher
        .apply(&mut state, &waiting("web", 0), false)
        .expect("apply");
    assert!(applied);

    let history = state.processes.get("web").expect("history exists");
    assert_eq!(history.state, OutcomeState::Active);
    assert_eq!(history.runs.len(), 1);
    let run = history.current_run().expect("current run");
    assert_eq!(run.sequence, Some(0));
    assert_eq!(run.run_state, Some(RunState::Waiting));
}

#[test]
fn rejected_first_record_leaves_process_unknown() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();

    // RUNNING cannot be the first state of a run.
    let result = dispatcher.apply(&mut state, &running("web", 0), false);
    assert!(matches!(
        result,
        Err(DispatchError::InvalidStateTransition(_))
    ));
    assert!(state.processes.is_empty(), "no history on rejection");
}

#[test]
fn update_without_process_name_is_rejected() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();

    let record = CheckpointRecord::ProcessUpdate(ProcessState {
        sequence: Some(0),
        run_state: Some(RunState::Waiting),
        ..ProcessState::default()
    });
    let result = dispatcher.apply(&mut state, &record, false);
    assert!(matches!(result, Err(DispatchError::Recovery(_))));
}

#[test]
fn forked_updates_run_in_place() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();

    dispatcher
        .apply(&mut state, &waiting("web", 0), false)
        .expect("waiting");
    let applied = dispatcher
        .apply(&mut state, &forked("web", 1), false)
        .expect("forked");
    assert!(applied);

    let history = state.processes.get("web").expect("history");
    assert_eq!(history.runs.len(), 1, "same run advanced in place");
    let run = history.current_run().expect("current run");
    assert_eq!(run.sequence, Some(1));
    assert_eq!(run.run_state, Some(RunState::Forked));
    assert!(run.fork_time.is_some());
    assert_eq!(run.supervisor_pid, Some(100));
}

#[test]
fn duplicate_forked_replay_behavior() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    dispatcher
        .apply(&mut state, &waiting("web", 0), false)
        .expect("waiting");
    dispatcher
        .apply(&mut state, &forked("web", 1), false)
        .expect("forked");
    let before = state.clone();

    // Outside recovery a duplicate is fatal.
    let result = dispatcher.apply(&mut state, &forked("web", 1), false);
    assert!(matches!(
        result,
        Err(DispatchError::InvalidSequenceNumber(_))
    ));
    assert_eq!(state, before);

    // In recovery it reports "already applied" and changes nothing.
    let applied = dispatcher
        .apply(&mut state, &forked("web", 1), true)
        .expect("no error in recovery");
    assert!(!applied);
    assert_eq!(state, before);
}

#[test]
fn two_consecutive_terminal_states_are_rejected() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    dispatcher
        .apply(&mut state, &waiting("web", 0), false)
        .expect("waiting");
    dispatcher
        .apply(&mut state, &forked("web", 1), false)
        .expect("forked");
    dispatcher
        .apply(&mut state, &running("web", 2), false)
        .expect("running");
    dispatcher
        .apply(&mut state, &killed("web", 3), false)
        .expect("killed");
    let before = state.clone();

    let result = dispatcher.apply(&mut state, &finished("web", 4, 0), false);
    assert!(matches!(result, Err(DispatchError::Recovery(_))));
    assert_eq!(state, before, "rejection leaves state unmodified");
}

#[test]
fn nonterminal_after_terminal_forges_new_run() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    dispatcher
        .apply(&mut state, &waiting("web", 0), false)
        .expect("waiting");
    dispatcher
        .apply(&mut state, &forked("web", 1), false)
        .expect("forked");
    dispatcher
        .apply(&mut state, &running("web", 2), false)
        .expect("running");
    dispatcher
        .apply(&mut state, &killed("web", 3), false)
        .expect("killed");

    let applied = dispatcher
        .apply(&mut state, &waiting("web", 3), false)
        .expect("new run");
    assert!(applied);

    let history = state.processes.get("web").expect("history");
    assert_eq!(history.runs.len(), 2, "fresh run appended");
    let run = history.current_run().expect("current run");
    assert_eq!(run.sequence, Some(4), "new run numbered after the old tail");
    assert_eq!(run.run_state, Some(RunState::Waiting));
    assert!(run.fork_time.is_none(), "fresh run carries no stale fields");

    // The completed run is untouched underneath.
    assert_eq!(history.runs[0].run_state, Some(RunState::Killed));
    assert_eq!(history.runs[0].sequence, Some(3));
}

// ── would_apply ──────────────────────────────────────

#[test]
fn would_apply_is_true_for_unseen_process() {
    let dispatcher = CheckpointDispatcher::new();
    let state = TaskState::new();
    assert!(dispatcher.would_apply(&state, &waiting("web", 0)));
}

#[test]
fn would_apply_tracks_the_sequence_high_water_mark() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    dispatcher
        .apply(&mut state, &waiting("web", 0), false)
        .expect("waiting");
    dispatcher
        .apply(&mut state, &forked("web", 1), false)
        .expect("forked");

    assert!(!dispatcher.would_apply(&state, &forked("web", 1)));
    assert!(!dispatcher.would_apply(&state, &waiting("web", 0)));
    assert!(dispatcher.would_apply(&state, &running("web", 2)));
}

#[test]
fn would_apply_is_false_for_other_record_kinds() {
    let dispatcher = CheckpointDispatcher::new();
    let state = TaskState::new();

    let header = CheckpointRecord::RunnerHeader(RunnerHeader::new("task-1"));
    let port = CheckpointRecord::AllocatedPort {
        port_name: "http".into(),
        port: 8080,
    };
    assert!(!dispatcher.would_apply(&state, &header));
    assert!(!dispatcher.would_apply(&state, &port));
}

#[test]
fn would_apply_never_mutates_state() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();
    dispatcher
        .apply(&mut state, &waiting("web", 0), false)
        .expect("waiting");
    let before = state.clone();

    dispatcher.would_apply(&state, &forked("web", 1));
    dispatcher.would_apply(&state, &waiting("other", 0));
    assert_eq!(state, before);
}

#[test]
fn would_apply_agrees_with_apply() {
    let mut dispatcher = CheckpointDispatcher::new();
    let mut state = TaskState::new();

    // New process: predicted true, applies.
    let record = waiting("web", 0);
    assert!(dispatcher.would_apply(&state, &record));
    assert!(dispatcher.apply(&mut state, &record, false).expect("apply"));

    // Higher sequence: predicted true, applies.
    let record = forked("web", 1);
    assert!(dispatcher.would_apply(&state, &record));
    assert!(dispatcher.apply(&mut state, &record, false).expect("apply"));

    // Stale sequence: predicted false, reports not-applied in recovery.
    let record = forked("web", 1);
    assert!(!dispatcher.would_apply(&state, &record));
    assert!(!dispatcher.apply(&mut state, &record, true).expect("replay"));
}
