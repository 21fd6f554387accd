//! Board session.
//!
//! The explicitly-owned object behind one open board (or single-task) view.
//! It constructs and wires the snapshot store, mutation pipeline, coalescing
//! scheduler and remote listener — no hidden singletons — and exposes the
//! drag-and-drop status operations, archiving, delete confirmation and bulk
//! flows on top of the pipeline. `close()` forces a final flush so partial
//! edits are never lost on teardown.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::backend::{Identity, RemoteEvent, SharedBackend};
use crate::config::SyncConfig;
use crate::error::{MutationOutcome, SyncError, ValidationError};
use crate::model::{TaskChange, TaskFields, TaskStatus};
use crate::notice::{Notice, NoticeBroadcaster};
use crate::pipeline::{MutateOptions, MutationPipeline};
use crate::remote::{MergeReport, RemoteChangeListener};
use crate::store::{SharedSnapshotStore, SnapshotStore, StoreEvent};

pub struct BoardSession {
    store: SharedSnapshotStore,
    pipeline: MutationPipeline,
    listener: RemoteChangeListener,
    notices: NoticeBroadcaster,
    backend: SharedBackend,
}

impl BoardSession {
    /// Load a tenant's board and wire the synchronization core around it.
    pub async fn open(
        backend: SharedBackend,
        identity: Arc<dyn Identity>,
        company_id: Uuid,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        let store: SharedSnapshotStore = Arc::new(SnapshotStore::new(config.store_event_capacity));
        let notices = NoticeBroadcaster::new(config.notice_capacity);
        let pipeline = MutationPipeline::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            identity,
            notices.clone(),
            &config,
        );
        let listener = RemoteChangeListener::new(Arc::clone(&store), pipeline.inflight());

        let tasks = backend
            .fetch_board(company_id)
            .await
            .map_err(SyncError::persistence)?;
        info!(%company_id, tasks = tasks.len(), "board session opened");
        for task in tasks {
            store.put(task);
        }

        Ok(Self {
            store,
            pipeline,
            listener,
            notices,
            backend,
        })
    }

    // ── Presentation contract ────────────────────────────────────────────────

    /// The read side handed to views: `get`/`subscribe` only. Views never
    /// write the store directly.
    pub fn store(&self) -> &SharedSnapshotStore {
        &self.store
    }

    pub fn subscribe_store(&self) -> tokio::sync::broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    pub fn subscribe_notices(&self) -> tokio::sync::broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// The mutation entry point handed to views.
    pub fn pipeline(&self) -> &MutationPipeline {
        &self.pipeline
    }

    /// Shorthand for `pipeline().mutate(..)`.
    pub async fn mutate(
        &self,
        task_id: Uuid,
        change: TaskChange,
        options: MutateOptions,
    ) -> MutationOutcome {
        self.pipeline.mutate(task_id, change, options).await
    }

    // ── Remote feed ──────────────────────────────────────────────────────────

    /// Merge one server-pushed row event into the store.
    pub fn apply_remote(&self, event: RemoteEvent) -> MergeReport {
        self.listener.apply(event)
    }

    /// Re-fetch one task and replace its snapshot, for dependent reads the
    /// feed cannot satisfy (e.g. a responsible's server-resolved display
    /// name). In-flight fields keep their local optimistic values. Returns
    /// `false` when the task no longer exists remotely, in which case the
    /// snapshot is dropped.
    pub async fn refresh_task(&self, task_id: Uuid) -> Result<bool, SyncError> {
        let fetched = self
            .backend
            .fetch_task(task_id)
            .await
            .map_err(SyncError::persistence)?;
        match fetched {
            Some(fresh) => Ok(self.listener.refresh(fresh)),
            None => {
                if self.store.remove(task_id).is_some() {
                    self.pipeline.forget_task(task_id);
                    info!(%task_id, "task gone remotely, snapshot dropped on refresh");
                }
                Ok(false)
            }
        }
    }

    // ── Status transitions (drag and drop) ───────────────────────────────────

    /// Drag a task to another board column, landing at `position` within it.
    /// Transitions are unordered — any status is reachable from any other.
    /// Immediate persistence: on failure the task returns to its prior
    /// column (status and position revert).
    pub async fn move_task(
        &self,
        task_id: Uuid,
        status: TaskStatus,
        position: i64,
    ) -> MutationOutcome {
        let fields = TaskFields {
            status: Some(status),
            position: Some(position),
            ..TaskFields::default()
        };
        self.pipeline
            .mutate(task_id, TaskChange::Fields(fields), MutateOptions::immediate())
            .await
    }

    /// Reorder within the current column — a position change with no status
    /// change, same persistence discipline.
    pub async fn reorder_task(&self, task_id: Uuid, position: i64) -> MutationOutcome {
        let fields = TaskFields {
            position: Some(position),
            ..TaskFields::default()
        };
        self.pipeline
            .mutate(task_id, TaskChange::Fields(fields), MutateOptions::immediate())
            .await
    }

    // ── Archive & delete ─────────────────────────────────────────────────────

    pub async fn archive_task(&self, task_id: Uuid) -> MutationOutcome {
        self.pipeline
            .mutate(
                task_id,
                TaskChange::Fields(TaskFields::archived(true)),
                MutateOptions::immediate(),
            )
            .await
    }

    pub async fn unarchive_task(&self, task_id: Uuid) -> MutationOutcome {
        self.pipeline
            .mutate(
                task_id,
                TaskChange::Fields(TaskFields::archived(false)),
                MutateOptions::immediate(),
            )
            .await
    }

    /// Open the delete confirmation for a task. While pending, archiving the
    /// task is rejected.
    pub fn request_delete(&self, task_id: Uuid) -> MutationOutcome {
        self.pipeline.set_pending_delete(task_id, true)
    }

    pub fn cancel_delete(&self, task_id: Uuid) -> MutationOutcome {
        self.pipeline.set_pending_delete(task_id, false)
    }

    /// Confirm deletion: flush any buffered edits (their task row still
    /// exists at this point), delete remotely, then drop the snapshot. On
    /// failure the snapshot stays, with the confirmation cleared so the
    /// user can retry or archive.
    pub async fn confirm_delete(&self, task_id: Uuid) -> MutationOutcome {
        if !self.store.contains(task_id) {
            return MutationOutcome::Rejected(ValidationError::UnknownTask(task_id));
        }
        self.pipeline.flush_task(task_id).await;
        match self.backend.delete_task(task_id).await {
            Ok(()) => {
                self.store.remove(task_id);
                self.pipeline.forget_task(task_id);
                info!(%task_id, "task deleted");
                MutationOutcome::Applied
            }
            Err(err) => {
                let message = err.to_string();
                self.pipeline.set_pending_delete(task_id, false);
                self.notices
                    .persistence_failed(task_id, vec!["delete".to_string()], message.clone());
                MutationOutcome::Reverted(message)
            }
        }
    }

    // ── Bulk operations ──────────────────────────────────────────────────────

    /// Archive several tasks. Each task goes through the pipeline on its
    /// own, so a single failure reverts only that task.
    pub async fn archive_many(&self, task_ids: &[Uuid]) -> Vec<(Uuid, MutationOutcome)> {
        let mut outcomes = Vec::with_capacity(task_ids.len());
        for &task_id in task_ids {
            outcomes.push((task_id, self.archive_task(task_id).await));
        }
        outcomes
    }

    /// Delete several tasks with per-task outcomes, same discipline.
    pub async fn delete_many(&self, task_ids: &[Uuid]) -> Vec<(Uuid, MutationOutcome)> {
        let mut outcomes = Vec::with_capacity(task_ids.len());
        for &task_id in task_ids {
            outcomes.push((task_id, self.confirm_delete(task_id).await));
        }
        outcomes
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Tear the session down, flushing every pending debounce buffer first.
    /// In-flight persistence calls are not cancelled; buffered edits are
    /// never dropped.
    pub async fn close(self) {
        self.pipeline.flush_all().await;
        info!("board session closed");
    }
}
