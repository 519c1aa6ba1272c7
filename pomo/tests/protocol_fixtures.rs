//! Fixture tests - the on-disk and on-wire JSON formats other tools may read
//!
//! The fixtures under tests/fixtures are hand-written, not produced by this
//! crate, so a change to field names or encodings shows up here.

use chrono::{TimeZone, Utc};
use pomo_lib::error::PomoError;
use pomo_lib::session::config::Config;
use pomo_lib::session::persistence::{JsonTaskStore, TaskStore, TimeRange};
use pomo_lib::session::protocol::{
    deserialize_message, ErrorCode, SessionPhase, SessionRequest, SessionResponse,
};
use pomo_lib::task::functional::{find_many, flatten, prune};
use pomo_lib::task::{Filter, PomodoroState, ROOT_ID};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

fn fixture_path(name: &str) -> PathBuf {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    PathBuf::from(manifest_dir)
        .join("tests/fixtures")
        .join(name)
}

fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

/// Store backed by a copy of tasks.json in a fresh temp dir
fn fixture_store() -> (TempDir, JsonTaskStore) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::in_dir(temp_dir.path().to_path_buf());
    std::fs::copy(fixture_path("tasks.json"), config.tasks_file()).unwrap();
    (temp_dir, JsonTaskStore::new(&config))
}

#[test]
fn test_status_request() {
    let request: SessionRequest =
        deserialize_message(read_fixture("status_request.json").as_bytes()).unwrap();
    assert_eq!(request, SessionRequest::Status);
}

#[test]
fn test_status_response() {
    let json = read_fixture("status_response.json");
    let response: SessionResponse = serde_json::from_str(&json).unwrap();

    let SessionResponse::Status { status } = response else {
        panic!("Expected Status variant");
    };
    assert_eq!(status.task_id, 12);
    assert_eq!(status.phase, SessionPhase::Running);
    assert_eq!(status.duration_ms, 25 * 60 * 1000);
    assert_eq!(status.remaining_secs, Some(13 * 60));
    assert_eq!(status.completed_count(), 1);

    let active = status.active().unwrap();
    assert_eq!(active.state, PomodoroState::Running);
    assert_eq!(
        active.start,
        Some(Utc.with_ymd_and_hms(2024, 6, 3, 9, 25, 0).unwrap())
    );
    assert_eq!(active.end, None);
    assert_eq!(status.pomodoros[2].state, PomodoroState::Pending);
}

#[test]
fn test_error_response() {
    let json = read_fixture("error_response.json");
    let response: SessionResponse = serde_json::from_str(&json).unwrap();

    match response {
        SessionResponse::Error { code, message } => {
            assert_eq!(code, ErrorCode::PersistenceFailure);
            assert!(message.contains("No space left"));
        }
        other => panic!("Expected Error variant, got {:?}", other),
    }
}

#[test]
fn test_tasks_file_reads_as_forest() {
    let (_dir, store) = fixture_store();

    let root = store.read_task(ROOT_ID).unwrap();
    assert!(root.is_root());
    let ids: Vec<u64> = flatten(&root).iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    let report = store.read_task(1).unwrap();
    assert_eq!(report.duration, Duration::from_secs(25 * 60));
    assert_eq!(
        report.pomodoro_states(),
        vec![PomodoroState::Completed, PomodoroState::StoppedEarly]
    );

    // Nested tasks are addressable directly
    let draft = store.read_task(3).unwrap();
    assert_eq!(draft.message, "draft summary");
    assert!(draft.tags.is_empty());
    assert_eq!(draft.duration, Duration::from_secs(15 * 60));

    assert!(matches!(store.read_task(99), Err(PomoError::NotFound(99))));
}

#[test]
fn test_tasks_file_filters() {
    let (_dir, store) = fixture_store();
    let root = store.read_task(ROOT_ID).unwrap();

    let work = Filter::parse_all(&["tag=work"]).unwrap();
    let top: Vec<u64> = find_many(&root.subtasks, &work).iter().map(|t| t.id).collect();
    assert_eq!(top, vec![1]);

    // A matching subtask keeps its non-matching parent on display
    let data = Filter::parse_all(&["tag=data"]).unwrap();
    let pruned = prune(&root, &data);
    let ids: Vec<u64> = flatten(&pruned).iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_tasks_file_history_range() {
    let (_dir, store) = fixture_store();

    let all: Vec<u64> = store
        .read_tasks(TimeRange::all())
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(all, vec![1, 4]);

    let since = Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap();
    let started: Vec<u64> = store
        .read_tasks(TimeRange::since(since))
        .unwrap()
        .iter()
        .map(|t| t.id)
        .collect();
    assert_eq!(started, vec![1]);
}

#[test]
fn test_tasks_file_next_id_is_respected() {
    let (_dir, store) = fixture_store();
    let task = pomo_lib::task::Task::new("new", vec![], Duration::from_secs(60), 1).unwrap();
    assert_eq!(store.write_task(&task).unwrap(), 5);
}
