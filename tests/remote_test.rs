//! Integration tests for the remote change feed: field-wise merges into the
//! local snapshot, suppression of fields with in-flight local edits, and
//! child-row upserts.

use std::sync::Arc;
use std::time::Duration;

use boardsync::backend::{RemoteEvent, RemoteRow, RowOp, TaskRow};
use boardsync::{
    Activity, ActivityTag, BoardSession, Comment, FieldKey, MemoryBackend, MutateOptions,
    Priority, StaticIdentity, SyncConfig, Task, TaskChange, TaskFields, TaskStatus,
};
use chrono::Utc;
use tokio::time::sleep;
use uuid::Uuid;

const WINDOW_MS: u64 = 100;

async fn session_with(backend: &Arc<MemoryBackend>, company_id: Uuid) -> BoardSession {
    let identity = Arc::new(StaticIdentity::new(Uuid::new_v4(), "Maria Souza"));
    BoardSession::open(
        backend.clone() as Arc<dyn boardsync::TaskBackend>,
        identity,
        company_id,
        SyncConfig {
            debounce_ms: WINDOW_MS,
            ..SyncConfig::default()
        },
    )
    .await
    .expect("session opens")
}

fn seeded(backend: &MemoryBackend, company_id: Uuid, title: &str) -> Task {
    let task = Task::bare(
        Uuid::new_v4(),
        company_id,
        title,
        TaskStatus::Created,
        Priority::Medium,
    );
    backend.seed(task.clone());
    task
}

fn row_for(task: &Task) -> TaskRow {
    TaskRow {
        id: task.id,
        company_id: task.company_id,
        title: task.title.clone(),
        description: task.description.clone(),
        priority: task.priority,
        status: task.status,
        due_date: task.due_date,
        due_time: task.due_time,
        archived: task.archived,
        elapsed_minutes: task.elapsed_minutes,
        position: task.position,
        created_at: task.created_at,
        updated_at: Utc::now(),
    }
}

// ── Scalar merges ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_remote_update_overwrites_settled_fields() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let task = seeded(&backend, company, "local title");
    let session = session_with(&backend, company).await;

    let mut row = row_for(&task);
    row.title = "remote title".to_string();
    row.priority = Priority::High;
    let report = session.apply_remote(RemoteEvent::new(RowOp::Update, RemoteRow::Tasks(row)));

    assert!(report.applied);
    assert!(report.suppressed.is_empty());
    let got = session.store().get(task.id).unwrap();
    assert_eq!(got.title, "remote title");
    assert_eq!(got.priority, Priority::High);
}

#[tokio::test]
async fn test_remote_insert_adds_an_unseen_task() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let session = session_with(&backend, company).await;

    let fresh = Task::bare(
        Uuid::new_v4(),
        company,
        "created elsewhere",
        TaskStatus::Created,
        Priority::Low,
    );
    session.apply_remote(RemoteEvent::new(RowOp::Insert, RemoteRow::Tasks(row_for(&fresh))));

    assert_eq!(
        session.store().get(fresh.id).unwrap().title,
        "created elsewhere"
    );
}

#[tokio::test]
async fn test_remote_delete_drops_the_task() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let task = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;

    session.apply_remote(RemoteEvent::new(RowOp::Delete, RemoteRow::Tasks(row_for(&task))));
    assert!(session.store().get(task.id).is_none());
}

// ── In-flight suppression ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_in_flight_field_ignores_the_remote_value_until_settled() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let task = seeded(&backend, company, "local title");
    let session = session_with(&backend, company).await;

    // A debounced edit keeps the title in flight until the window elapses
    // and the flush settles.
    session
        .mutate(
            task.id,
            TaskChange::Fields(TaskFields::title("typing...")),
            MutateOptions::debounced(),
        )
        .await;

    let mut row = row_for(&task);
    row.title = "remote title".to_string();
    row.description = Some("remote description".to_string());
    let event = RemoteEvent::new(RowOp::Update, RemoteRow::Tasks(row));

    let report = session.apply_remote(event.clone());
    assert_eq!(report.suppressed, vec![FieldKey::Title]);
    let got = session.store().get(task.id).unwrap();
    assert_eq!(got.title, "typing...", "local in-flight value kept");
    assert_eq!(
        got.description.as_deref(),
        Some("remote description"),
        "untouched fields still merge"
    );

    // Once the flush lands, a replay of the same event applies cleanly.
    sleep(Duration::from_millis(2 * WINDOW_MS)).await;
    let report = session.apply_remote(event);
    assert!(report.suppressed.is_empty());
    assert_eq!(
        session.store().get(task.id).unwrap().title,
        "remote title"
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_flush_revert_keeps_a_value_merged_mid_buffer() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let task = seeded(&backend, company, "Draft report");
    let session = session_with(&backend, company).await;

    // The buffer opens with a title edit only.
    session
        .mutate(
            task.id,
            TaskChange::Fields(TaskFields::title("Draft v2")),
            MutateOptions::debounced(),
        )
        .await;

    // A remote description lands while the buffer is open; the title is in
    // flight, the description is not.
    let mut row = row_for(&task);
    row.description = Some("remote note".to_string());
    session.apply_remote(RemoteEvent::new(RowOp::Update, RemoteRow::Tasks(row)));
    assert_eq!(
        session.store().get(task.id).unwrap().description.as_deref(),
        Some("remote note")
    );

    // A second buffered edit then touches the description too, and the
    // flush fails. The revert must restore the remote value for the
    // description, not the one from when the buffer opened.
    session
        .mutate(
            task.id,
            TaskChange::Fields(TaskFields::description(Some("local note".to_string()))),
            MutateOptions::debounced(),
        )
        .await;
    backend.fail_next_updates(1);
    sleep(Duration::from_millis(3 * WINDOW_MS)).await;

    let got = session.store().get(task.id).unwrap();
    assert_eq!(got.title, "Draft report", "title back to its buffer-open value");
    assert_eq!(
        got.description.as_deref(),
        Some("remote note"),
        "description back to the remote value merged mid-buffer"
    );
}

// ── Child rows ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_remote_comment_merges_additively() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let mut task = seeded(&backend, company, "t");
    task.comments.push(Comment {
        id: Uuid::new_v4(),
        task_id: task.id,
        author_id: Uuid::new_v4(),
        author_name: "Maria Souza".to_string(),
        body: "mine".to_string(),
        created_at: Utc::now(),
    });
    backend.seed(task.clone());
    let session = session_with(&backend, company).await;

    let theirs = Comment {
        id: Uuid::new_v4(),
        task_id: task.id,
        author_id: Uuid::new_v4(),
        author_name: "Alex Kim".to_string(),
        body: "theirs".to_string(),
        created_at: Utc::now(),
    };
    session.apply_remote(RemoteEvent::new(RowOp::Insert, RemoteRow::Comments(theirs)));

    let got = session.store().get(task.id).unwrap();
    assert_eq!(got.comments.len(), 2, "existing comment survives the merge");
}

#[tokio::test]
async fn test_remote_activity_echo_is_deduplicated_by_id() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let task = seeded(&backend, company, "Draft report");
    let session = session_with(&backend, company).await;

    session
        .mutate(
            task.id,
            TaskChange::Fields(TaskFields::title("Final report")),
            MutateOptions::immediate(),
        )
        .await;
    let local = session.store().get(task.id).unwrap().activities;
    assert_eq!(local.len(), 1);

    // The feed echoes back the audit row this session just persisted.
    session.apply_remote(RemoteEvent::new(
        RowOp::Insert,
        RemoteRow::Activities(local[0].clone()),
    ));
    assert_eq!(
        session.store().get(task.id).unwrap().activities.len(),
        1,
        "echo does not duplicate the entry"
    );
}

#[tokio::test]
async fn test_remote_activity_from_another_actor_is_appended() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let task = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;

    let theirs = Activity::new(
        task.id,
        Uuid::new_v4(),
        "Alex Kim",
        ActivityTag::Edited,
        "Changed the priority from Medium to High",
    );
    session.apply_remote(RemoteEvent::new(RowOp::Insert, RemoteRow::Activities(theirs)));
    assert_eq!(session.store().get(task.id).unwrap().activities.len(), 1);
}

#[tokio::test]
async fn test_child_row_for_unknown_task_is_dropped() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let session = session_with(&backend, company).await;

    let orphan = Comment {
        id: Uuid::new_v4(),
        task_id: Uuid::new_v4(),
        author_id: Uuid::new_v4(),
        author_name: "Alex Kim".to_string(),
        body: "orphan".to_string(),
        created_at: Utc::now(),
    };
    let report =
        session.apply_remote(RemoteEvent::new(RowOp::Insert, RemoteRow::Comments(orphan)));
    assert!(!report.applied);
}
