//! Mutation pipeline.
//!
//! The single entry point for local edits: validates, applies optimistically
//! to the snapshot store, marks the touched fields in flight, and persists
//! either immediately or through the coalescing scheduler. Success clears
//! the in-flight markers and appends audit entries; failure reverts exactly
//! the fields the failed batch touched.
//!
//! Concurrency is resolved logically, not by locking: every field carries a
//! monotonically increasing sequence number while in flight. A completion —
//! success or failure — only acts on a field if the marker still holds that
//! mutation's sequence, so the last local edit of a field always eventually
//! wins over an earlier edit's late revert, regardless of arrival order.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity;
use crate::backend::{Identity, SharedBackend};
use crate::config::SyncConfig;
use crate::debounce::{CoalescingScheduler, FlushBatch, FlushSink};
use crate::error::{MutationOutcome, ValidationError};
use crate::model::{
    Activity, ActivityTag, FieldKey, StructuralChange, Task, TaskChange, TaskFields,
};
use crate::notice::NoticeBroadcaster;
use crate::store::SharedSnapshotStore;

// ── Options ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct MutateOptions {
    /// Bypass the coalescing scheduler and persist before returning. Used
    /// for status drags, checklist toggles, archiving — anything the user
    /// expects to be durable before leaving the view.
    pub immediate: bool,
}

impl MutateOptions {
    pub fn immediate() -> Self {
        Self { immediate: true }
    }

    pub fn debounced() -> Self {
        Self { immediate: false }
    }
}

// ── In-flight tracking ───────────────────────────────────────────────────────

/// Per-field in-flight markers: field key → sequence number of the local
/// mutation whose persistence round-trip has not yet resolved. Shared with
/// the remote listener, which skips marked fields when merging.
pub(crate) struct InflightTracker {
    seq: AtomicU64,
    map: Mutex<HashMap<Uuid, HashMap<FieldKey, u64>>>,
}

impl InflightTracker {
    pub(crate) fn new() -> Self {
        Self {
            seq: AtomicU64::new(1),
            map: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Mark fields as owned by `seq`. A newer mutation of the same field
    /// overwrites the marker — the older mutation's completion then no
    /// longer owns the field.
    pub(crate) fn mark(&self, task_id: Uuid, keys: &[FieldKey], seq: u64) {
        let mut map = self.lock();
        let fields = map.entry(task_id).or_default();
        for key in keys {
            fields.insert(*key, seq);
        }
    }

    /// Clear the marker for a field if it is still owned by `seq`. Returns
    /// whether this completion owned the field.
    pub(crate) fn complete(&self, task_id: Uuid, key: FieldKey, seq: u64) -> bool {
        let mut map = self.lock();
        let Some(fields) = map.get_mut(&task_id) else {
            return false;
        };
        match fields.get(&key) {
            Some(&owner) if owner == seq => {
                fields.remove(&key);
                if fields.is_empty() {
                    map.remove(&task_id);
                }
                true
            }
            _ => false,
        }
    }

    pub(crate) fn is_inflight(&self, task_id: Uuid, key: FieldKey) -> bool {
        self.lock()
            .get(&task_id)
            .map(|fields| fields.contains_key(&key))
            .unwrap_or(false)
    }

    pub(crate) fn inflight_keys(&self, task_id: Uuid) -> HashSet<FieldKey> {
        self.lock()
            .get(&task_id)
            .map(|fields| fields.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every marker for a task (snapshot discarded).
    pub(crate) fn forget(&self, task_id: Uuid) {
        self.lock().remove(&task_id);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, HashMap<FieldKey, u64>>> {
        match self.map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

// ── Commit path ──────────────────────────────────────────────────────────────

/// Persists accepted batches and resolves their in-flight markers. Shared by
/// the immediate path and the scheduler's flush path.
pub(crate) struct Committer {
    store: SharedSnapshotStore,
    backend: SharedBackend,
    identity: Arc<dyn Identity>,
    notices: NoticeBroadcaster,
    inflight: Arc<InflightTracker>,
}

impl Committer {
    /// Persist a coalesced field batch. On success, clears the markers this
    /// batch still owns and appends audit entries for the net change. On
    /// failure, reverts exactly the owned fields to the batch's pre values.
    pub(crate) async fn commit_fields(
        &self,
        task_id: Uuid,
        batch: FlushBatch,
    ) -> Result<(), String> {
        match self.backend.update_task(task_id, &batch.fields).await {
            Ok(()) => {
                for (&key, &seq) in &batch.seqs {
                    self.inflight.complete(task_id, key, seq);
                }
                info!(%task_id, fields = batch.seqs.len(), "persisted field batch");
                self.record_field_activities(task_id, &batch).await;
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                let mut reverted = Vec::new();
                for (&key, &seq) in &batch.seqs {
                    // Only revert fields this batch still owns; a newer
                    // in-flight mutation's own resolution decides the rest.
                    if self.inflight.complete(task_id, key, seq) {
                        self.store.update(task_id, |task| {
                            TaskFields::revert_field(task, &batch.first_pre, key);
                        });
                        reverted.push(key.name().to_string());
                    }
                }
                warn!(%task_id, error = %message, reverted = ?reverted, "field batch failed, reverted");
                self.notices
                    .persistence_failed(task_id, reverted, message.clone());
                Err(message)
            }
        }
    }

    /// Persist a structural change. Same discipline, child-row granularity.
    pub(crate) async fn commit_structural(
        &self,
        task_id: Uuid,
        pre: Task,
        change: StructuralChange,
        seq: u64,
    ) -> Result<(), String> {
        let key = change.field_key();
        match self.backend.apply_structural(task_id, &change).await {
            Ok(()) => {
                self.inflight.complete(task_id, key, seq);
                info!(%task_id, change = key.name(), "persisted structural change");
                self.record_structural_activity(task_id, &change).await;
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                if self.inflight.complete(task_id, key, seq) {
                    self.store.update(task_id, |task| {
                        change.revert_on(task, &pre);
                    });
                }
                warn!(%task_id, change = key.name(), error = %message, "structural change failed, reverted");
                self.notices.persistence_failed(
                    task_id,
                    vec![key.name().to_string()],
                    message.clone(),
                );
                Err(message)
            }
        }
    }

    /// Derive and append audit entries for an accepted field batch: the
    /// snapshot diff for edited categories, plus dedicated wording for
    /// status transitions and archive flips.
    async fn record_field_activities(&self, task_id: Uuid, batch: &FlushBatch) {
        let pre = &batch.first_pre;
        let mut post = pre.clone();
        batch.fields.apply_to(&mut post);

        let mut entries: Vec<(ActivityTag, String)> = Vec::new();
        if pre.status != post.status {
            entries.push((
                ActivityTag::ChangedStatus,
                activity::status_line(pre.status, post.status),
            ));
        }
        if pre.archived != post.archived {
            entries.push((ActivityTag::Archived, activity::archived_line(post.archived)));
        }
        for line in activity::diff(pre, &post) {
            entries.push((ActivityTag::Edited, line));
        }
        self.append_activities(task_id, entries).await;
    }

    async fn record_structural_activity(&self, task_id: Uuid, change: &StructuralChange) {
        let entry = match change {
            StructuralChange::AddComment(_) => {
                Some((ActivityTag::Commented, "Commented on the task".to_string()))
            }
            StructuralChange::AddResponsible(r) => {
                Some((ActivityTag::Edited, activity::assigned_line(r)))
            }
            // Unassign wording needs the removed row, which the live
            // snapshot no longer holds; the pipeline appends it from the
            // pre snapshot after the commit resolves.
            _ => None,
        };
        if let Some(entry) = entry {
            self.append_activities(task_id, vec![entry]).await;
        }
    }

    async fn append_activities(&self, task_id: Uuid, entries: Vec<(ActivityTag, String)>) {
        let actor = self.identity.actor();
        for (tag, description) in entries {
            let record = Activity::new(task_id, actor.id, actor.name.clone(), tag, description);
            // An audit write failure must not undo the accepted mutation;
            // log it and keep the local copy so a retry path can reconcile.
            if let Err(err) = self.backend.insert_activity(&record).await {
                warn!(%task_id, error = %err, "failed to persist activity entry");
            }
            // Keyed by id: the remote echo of this row will not duplicate it.
            self.store.update(task_id, |task| task.upsert_activity(record.clone()));
        }
    }
}

#[async_trait]
impl FlushSink for Committer {
    async fn flush(&self, task_id: Uuid, batch: FlushBatch) {
        // Debounced failures surface on the notice channel, not to a caller.
        let _ = self.commit_fields(task_id, batch).await;
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// The mutation entry point handed to the presentation layer. Cheap to
/// clone; all clones share the same store, scheduler and in-flight state.
#[derive(Clone)]
pub struct MutationPipeline {
    store: SharedSnapshotStore,
    committer: Arc<Committer>,
    scheduler: Arc<CoalescingScheduler>,
    notices: NoticeBroadcaster,
    inflight: Arc<InflightTracker>,
}

impl MutationPipeline {
    pub(crate) fn new(
        store: SharedSnapshotStore,
        backend: SharedBackend,
        identity: Arc<dyn Identity>,
        notices: NoticeBroadcaster,
        config: &SyncConfig,
    ) -> Self {
        let inflight = Arc::new(InflightTracker::new());
        let committer = Arc::new(Committer {
            store: Arc::clone(&store),
            backend,
            identity,
            notices: notices.clone(),
            inflight: Arc::clone(&inflight),
        });
        let scheduler = Arc::new(CoalescingScheduler::new(
            config.debounce_window(),
            Arc::clone(&committer) as Arc<dyn FlushSink>,
        ));
        Self {
            store,
            committer,
            scheduler,
            notices,
            inflight,
        }
    }

    /// Apply a local change. Optimistic: the snapshot store reflects the new
    /// value before this returns, except on `Rejected` (validation happens
    /// first, so a rejected change never touches the store).
    pub async fn mutate(
        &self,
        task_id: Uuid,
        change: TaskChange,
        options: MutateOptions,
    ) -> MutationOutcome {
        let Some(pre) = self.store.get(task_id) else {
            return self.reject(task_id, ValidationError::UnknownTask(task_id));
        };
        match change {
            TaskChange::Fields(fields) => {
                self.mutate_fields(task_id, pre, fields, options).await
            }
            // Structural changes always persist immediately: a toggled
            // checklist item or a new comment must be durable before the
            // user leaves the view.
            TaskChange::Structural(structural) => {
                self.mutate_structural(task_id, pre, structural).await
            }
        }
    }

    async fn mutate_fields(
        &self,
        task_id: Uuid,
        pre: Task,
        fields: TaskFields,
        options: MutateOptions,
    ) -> MutationOutcome {
        if let Err(err) = validate_fields(&pre, &fields) {
            return self.reject(task_id, err);
        }

        let keys = fields.keys();
        let seq = self.inflight.next_seq();
        self.inflight.mark(task_id, &keys, seq);
        self.store.patch(task_id, &fields);
        debug!(%task_id, seq, fields = keys.len(), immediate = options.immediate, "optimistic apply");

        if options.immediate {
            // A buffered debounced edit of the same fields must not flush
            // after this newer write; the remote store is last-writer-wins,
            // so the stale flush would win durably.
            self.scheduler.discard_fields(task_id, &keys);
            let batch = FlushBatch::new(pre, fields, seq);
            match self.committer.commit_fields(task_id, batch).await {
                Ok(()) => MutationOutcome::Applied,
                Err(reason) => MutationOutcome::Reverted(reason),
            }
        } else {
            self.scheduler.schedule(task_id, pre, fields, seq);
            MutationOutcome::Applied
        }
    }

    async fn mutate_structural(
        &self,
        task_id: Uuid,
        pre: Task,
        change: StructuralChange,
    ) -> MutationOutcome {
        if let Err(err) = validate_structural(&pre, &change) {
            return self.reject(task_id, err);
        }

        let key = change.field_key();
        let seq = self.inflight.next_seq();
        self.inflight.mark(task_id, &[key], seq);
        self.store.update(task_id, |task| {
            change.apply_to(task);
        });

        // Removed-responsible audit needs the row from the pre snapshot.
        let removed_line = match &change {
            StructuralChange::RemoveResponsible { responsible_id } => pre
                .responsibles
                .iter()
                .find(|r| r.id == *responsible_id)
                .map(activity::unassigned_line),
            _ => None,
        };

        match self
            .committer
            .commit_structural(task_id, pre, change, seq)
            .await
        {
            Ok(()) => {
                if let Some(line) = removed_line {
                    self.committer
                        .append_activities(task_id, vec![(ActivityTag::Edited, line)])
                        .await;
                }
                MutationOutcome::Applied
            }
            Err(reason) => MutationOutcome::Reverted(reason),
        }
    }

    /// Local-only bookkeeping flag for the delete confirmation dialog; not a
    /// persisted mutation, but still routed through the pipeline because
    /// views never write the store.
    pub fn set_pending_delete(&self, task_id: Uuid, pending: bool) -> MutationOutcome {
        match self.store.update(task_id, |task| task.pending_delete = pending) {
            Some(()) => MutationOutcome::Applied,
            None => MutationOutcome::Rejected(ValidationError::UnknownTask(task_id)),
        }
    }

    /// Force a task's debounce buffer out now.
    pub async fn flush_task(&self, task_id: Uuid) {
        self.scheduler.flush_task(task_id).await;
    }

    /// Force every pending buffer out. Teardown path.
    pub async fn flush_all(&self) {
        self.scheduler.flush_all().await;
    }

    /// Whether a task has edits buffered or in flight on the debounce path.
    pub fn has_pending_edits(&self, task_id: Uuid) -> bool {
        self.scheduler.is_dirty(task_id)
    }

    pub(crate) fn inflight(&self) -> Arc<InflightTracker> {
        Arc::clone(&self.inflight)
    }

    pub(crate) fn forget_task(&self, task_id: Uuid) {
        self.inflight.forget(task_id);
    }

    fn reject(&self, task_id: Uuid, err: ValidationError) -> MutationOutcome {
        debug!(%task_id, error = %err, "mutation rejected");
        self.notices.validation_failed(task_id, err.to_string());
        MutationOutcome::Rejected(err)
    }
}

// ── Validation ───────────────────────────────────────────────────────────────

fn validate_fields(pre: &Task, fields: &TaskFields) -> Result<(), ValidationError> {
    if fields.is_empty() {
        return Err(ValidationError::EmptyChange);
    }
    if let Some(title) = &fields.title {
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
    }
    // Archiving is blocked while a delete confirmation is open.
    if fields.archived == Some(true) && pre.pending_delete {
        return Err(ValidationError::PendingDelete);
    }
    Ok(())
}

fn validate_structural(pre: &Task, change: &StructuralChange) -> Result<(), ValidationError> {
    let missing = |kind: &'static str, id: Uuid| ValidationError::UnknownChild { kind, id };
    match change {
        StructuralChange::RemoveResponsible { responsible_id } => {
            if !pre.responsibles.iter().any(|r| r.id == *responsible_id) {
                return Err(missing("responsible", *responsible_id));
            }
        }
        StructuralChange::DeleteComment { comment_id } => {
            if !pre.comments.iter().any(|c| c.id == *comment_id) {
                return Err(missing("comment", *comment_id));
            }
        }
        StructuralChange::DeleteChecklist { checklist_id } => {
            if !pre.checklists.iter().any(|c| c.id == *checklist_id) {
                return Err(missing("checklist", *checklist_id));
            }
        }
        StructuralChange::AddChecklistItem { checklist_id, .. } => {
            if !pre.checklists.iter().any(|c| c.id == *checklist_id) {
                return Err(missing("checklist", *checklist_id));
            }
        }
        StructuralChange::RemoveChecklistItem {
            checklist_id,
            item_id,
        }
        | StructuralChange::ToggleChecklistItem {
            checklist_id,
            item_id,
            ..
        } => {
            let item_exists = pre
                .checklists
                .iter()
                .find(|c| c.id == *checklist_id)
                .is_some_and(|c| c.items.iter().any(|i| i.id == *item_id));
            if !item_exists {
                return Err(missing("checklist_item", *item_id));
            }
        }
        StructuralChange::RemoveAttachment { attachment_id } => {
            if !pre.attachments.iter().any(|a| a.id == *attachment_id) {
                return Err(missing("attachment", *attachment_id));
            }
        }
        StructuralChange::AddResponsible(_)
        | StructuralChange::AddComment(_)
        | StructuralChange::AddChecklist(_)
        | StructuralChange::AddAttachment(_) => {}
    }
    Ok(())
}
