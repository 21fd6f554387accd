//! Integration tests for the board session surface: status drags, archiving,
//! two-step deletion, bulk operations and teardown.

use std::sync::Arc;
use std::time::Duration;

use boardsync::{
    ActivityTag, BoardSession, MemoryBackend, MutateOptions, MutationOutcome, Notice, Priority,
    StaticIdentity, SyncConfig, Task, TaskBackend, TaskChange, TaskFields, TaskStatus,
    ValidationError,
};
use tokio::time::sleep;
use uuid::Uuid;

async fn session_with(backend: &Arc<MemoryBackend>, company_id: Uuid) -> BoardSession {
    let identity = Arc::new(StaticIdentity::new(Uuid::new_v4(), "Maria Souza"));
    BoardSession::open(
        backend.clone() as Arc<dyn boardsync::TaskBackend>,
        identity,
        company_id,
        SyncConfig {
            debounce_ms: 100,
            ..SyncConfig::default()
        },
    )
    .await
    .expect("session opens")
}

fn seeded(backend: &MemoryBackend, company_id: Uuid, title: &str) -> Uuid {
    let task = Task::bare(
        Uuid::new_v4(),
        company_id,
        title,
        TaskStatus::Created,
        Priority::Medium,
    );
    let id = task.id;
    backend.seed(task);
    id
}

// ── Status drags ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_drag_to_another_column_persists_immediately() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;

    let outcome = session.move_task(id, TaskStatus::Executing, 3).await;

    assert_eq!(outcome, MutationOutcome::Applied);
    let got = session.store().get(id).unwrap();
    assert_eq!(got.status, TaskStatus::Executing);
    assert_eq!(got.position, 3);
    // No debounce for drags: the write is already on the backend.
    assert_eq!(backend.update_calls(id).len(), 1);

    let audits = backend.activities(id);
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].tag, ActivityTag::ChangedStatus);
    assert_eq!(
        audits[0].description,
        "Moved the task from Created to Executing"
    );
}

#[tokio::test]
async fn test_any_column_to_any_column_is_allowed() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;

    // No transition ordering: validated straight back to created is legal.
    assert_eq!(
        session.move_task(id, TaskStatus::Validated, 0).await,
        MutationOutcome::Applied
    );
    assert_eq!(
        session.move_task(id, TaskStatus::Created, 0).await,
        MutationOutcome::Applied
    );
    assert_eq!(
        session.store().get(id).unwrap().status,
        TaskStatus::Created
    );
}

#[tokio::test]
async fn test_failed_drag_snaps_the_card_back() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;
    let mut notices = session.subscribe_notices();

    backend.fail_next_updates(1);
    let outcome = session.move_task(id, TaskStatus::Executing, 0).await;

    assert!(matches!(outcome, MutationOutcome::Reverted(_)));
    assert_eq!(
        session.store().get(id).unwrap().status,
        TaskStatus::Created,
        "card snaps back to its column"
    );
    assert!(backend.activities(id).is_empty());
    assert!(matches!(
        notices.recv().await.unwrap(),
        Notice::PersistenceFailed { .. }
    ));
}

#[tokio::test]
async fn test_reorder_within_a_column_writes_no_status_audit() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;

    let outcome = session.reorder_task(id, 5).await;
    assert_eq!(outcome, MutationOutcome::Applied);
    assert_eq!(session.store().get(id).unwrap().position, 5);
    assert!(
        backend.activities(id).is_empty(),
        "pure reordering is not audit-worthy"
    );
}

// ── Archiving ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_archive_and_unarchive_round_trip_with_audits() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;

    assert_eq!(session.archive_task(id).await, MutationOutcome::Applied);
    assert!(session.store().get(id).unwrap().archived);
    assert_eq!(session.unarchive_task(id).await, MutationOutcome::Applied);
    assert!(!session.store().get(id).unwrap().archived);

    let audits = backend.activities(id);
    assert_eq!(audits.len(), 2);
    assert_eq!(audits[0].tag, ActivityTag::Archived);
    assert_eq!(audits[0].description, "Archived the task");
    assert_eq!(audits[1].description, "Restored the task from the archive");
}

// ── Two-step deletion ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_pending_delete_blocks_archiving_until_cancelled() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;

    assert_eq!(session.request_delete(id), MutationOutcome::Applied);
    assert_eq!(
        session.archive_task(id).await,
        MutationOutcome::Rejected(ValidationError::PendingDelete)
    );

    // Other edits stay legal while the confirmation dialog is open.
    let outcome = session
        .mutate(
            id,
            TaskChange::Fields(TaskFields::title("still editable")),
            MutateOptions::immediate(),
        )
        .await;
    assert_eq!(outcome, MutationOutcome::Applied);

    assert_eq!(session.cancel_delete(id), MutationOutcome::Applied);
    assert_eq!(session.archive_task(id).await, MutationOutcome::Applied);
}

#[tokio::test(start_paused = true)]
async fn test_confirm_delete_flushes_pending_edits_first() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;

    session
        .mutate(
            id,
            TaskChange::Fields(TaskFields::title("last words")),
            MutateOptions::debounced(),
        )
        .await;
    session.request_delete(id);
    let outcome = session.confirm_delete(id).await;

    assert_eq!(outcome, MutationOutcome::Applied);
    assert!(session.store().get(id).is_none());
    // The pending edit was written before the row went away.
    let writes = backend.update_calls(id);
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].title.as_deref(), Some("last words"));
    assert!(backend.task(id).is_none());
}

#[tokio::test]
async fn test_failed_delete_restores_the_task() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;
    let mut notices = session.subscribe_notices();

    session.request_delete(id);
    backend.fail_next_deletes(1);
    let outcome = session.confirm_delete(id).await;

    assert!(matches!(outcome, MutationOutcome::Reverted(_)));
    assert!(session.store().get(id).is_some(), "snapshot kept");
    assert!(matches!(
        notices.recv().await.unwrap(),
        Notice::PersistenceFailed { .. }
    ));

    // The failed delete released the edit lock.
    let outcome = session
        .mutate(
            id,
            TaskChange::Fields(TaskFields::title("still here")),
            MutateOptions::immediate(),
        )
        .await;
    assert_eq!(outcome, MutationOutcome::Applied);
}

// ── Bulk operations ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bulk_archive_reports_per_task_outcomes() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let a = seeded(&backend, company, "a");
    let b = seeded(&backend, company, "b");
    let session = session_with(&backend, company).await;

    // Only the first write fails; the second task must still archive.
    backend.fail_next_updates(1);
    let outcomes = session.archive_many(&[a, b]).await;

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].0, a);
    assert!(matches!(outcomes[0].1, MutationOutcome::Reverted(_)));
    assert_eq!(outcomes[1], (b, MutationOutcome::Applied));
    assert!(!session.store().get(a).unwrap().archived);
    assert!(session.store().get(b).unwrap().archived);
}

#[tokio::test]
async fn test_bulk_delete_removes_each_confirmed_task() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let a = seeded(&backend, company, "a");
    let b = seeded(&backend, company, "b");
    let session = session_with(&backend, company).await;

    let outcomes = session.delete_many(&[a, b]).await;
    assert!(outcomes.iter().all(|(_, o)| o.is_applied()));
    assert!(session.store().is_empty());
    assert!(backend.task(a).is_none());
    assert!(backend.task(b).is_none());
}

// ── Refresh ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_refresh_keeps_in_flight_fields_local() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "remote truth");
    let session = session_with(&backend, company).await;

    // A debounced title edit is still in flight when the refresh lands.
    session
        .mutate(
            id,
            TaskChange::Fields(TaskFields::title("typing...")),
            MutateOptions::debounced(),
        )
        .await;
    let refreshed = session.refresh_task(id).await.unwrap();

    assert!(refreshed);
    assert_eq!(
        session.store().get(id).unwrap().title,
        "typing...",
        "in-flight title survives the wholesale refresh"
    );
}

#[tokio::test]
async fn test_refresh_of_a_remotely_deleted_task_drops_the_snapshot() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "t");
    let session = session_with(&backend, company).await;

    // Deleted out from under us, e.g. by another session.
    backend.delete_task(id).await.unwrap();
    let refreshed = session.refresh_task(id).await.unwrap();

    assert!(!refreshed);
    assert!(session.store().get(id).is_none());
}

// ── End to end ───────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_typing_then_closing_loses_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    let company = Uuid::new_v4();
    let id = seeded(&backend, company, "Draft report");
    let session = session_with(&backend, company).await;

    // Simulated typing burst, then the user closes the board mid-window.
    for title in ["Final", "Final rep", "Final report"] {
        session
            .mutate(
                id,
                TaskChange::Fields(TaskFields::title(title)),
                MutateOptions::debounced(),
            )
            .await;
        sleep(Duration::from_millis(15)).await;
    }
    session.close().await;

    let persisted = backend.task(id).unwrap();
    assert_eq!(persisted.title, "Final report");
    let audits = backend.activities(id);
    assert_eq!(audits.len(), 1);
    assert_eq!(
        audits[0].description,
        "Changed the title from \"Draft report\" to \"Final report\""
    );
}
