//! Remote change listener.
//!
//! Merges server-pushed row events into the snapshot store without
//! clobbering in-flight local edits. Task-row merges are field-wise: a field
//! currently marked in flight keeps its local optimistic value (the user's
//! own edit must not flicker under a stale echo of itself); every other
//! field takes the remote value. Child-table events are additive merges
//! keyed by child id — never a full-list clobber — so a locally-added
//! optimistic row survives events describing its siblings.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::backend::{RemoteEvent, RemoteRow, RowOp, TaskRow};
use crate::model::{Checklist, ChecklistItem, FieldKey, Task, TaskFields};
use crate::pipeline::InflightTracker;
use crate::store::SharedSnapshotStore;

/// What a merge did, for observability and tests. Suppression is a silent
/// deferral (the field's own round-trip will resolve it), not a failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub applied: bool,
    /// Fields whose remote value was ignored because a local mutation is in
    /// flight for them.
    pub suppressed: Vec<FieldKey>,
}

impl MergeReport {
    fn applied() -> Self {
        Self {
            applied: true,
            suppressed: Vec::new(),
        }
    }

    fn skipped() -> Self {
        Self::default()
    }
}

pub struct RemoteChangeListener {
    store: SharedSnapshotStore,
    inflight: Arc<InflightTracker>,
}

impl RemoteChangeListener {
    pub(crate) fn new(store: SharedSnapshotStore, inflight: Arc<InflightTracker>) -> Self {
        Self { store, inflight }
    }

    /// Merge one feed event. Events arrive in arbitrary order relative to
    /// local mutations; this never blocks and never touches the backend.
    pub fn apply(&self, event: RemoteEvent) -> MergeReport {
        let task_id = event.row.task_id();
        match (event.op, event.row) {
            (RowOp::Delete, RemoteRow::Tasks(_)) => {
                if self.store.remove(task_id).is_some() {
                    self.inflight.forget(task_id);
                    debug!(%task_id, "task removed by remote event");
                    MergeReport::applied()
                } else {
                    MergeReport::skipped()
                }
            }
            (_, RemoteRow::Tasks(row)) => self.merge_task_row(row),
            (op, RemoteRow::Responsibles(row)) => {
                let key = FieldKey::Responsible(row.id);
                self.merge_child(task_id, key, |task| match op {
                    RowOp::Delete => {
                        task.remove_responsible(row.id);
                    }
                    _ => task.upsert_responsible(row.clone()),
                })
            }
            (op, RemoteRow::Checklists(row)) => {
                let key = FieldKey::Checklist(row.id);
                self.merge_child(task_id, key, |task| match op {
                    RowOp::Delete => {
                        task.remove_checklist(row.id);
                    }
                    _ => task.upsert_checklist(Checklist {
                        id: row.id,
                        task_id: row.task_id,
                        name: row.name.clone(),
                        items: Vec::new(),
                    }),
                })
            }
            (op, RemoteRow::ChecklistItems(row)) => {
                let key = FieldKey::ChecklistItem(row.id);
                self.merge_child(task_id, key, |task| match op {
                    RowOp::Delete => {
                        task.remove_checklist_item(row.checklist_id, row.id);
                    }
                    _ => {
                        task.upsert_checklist_item(
                            row.checklist_id,
                            ChecklistItem {
                                id: row.id,
                                checklist_id: row.checklist_id,
                                content: row.content.clone(),
                                done: row.done,
                                position: row.position,
                            },
                        );
                    }
                })
            }
            (op, RemoteRow::Comments(row)) => {
                let key = FieldKey::Comment(row.id);
                self.merge_child(task_id, key, |task| match op {
                    RowOp::Delete => {
                        task.remove_comment(row.id);
                    }
                    _ => task.upsert_comment(row.clone()),
                })
            }
            (op, RemoteRow::Activities(row)) => {
                // Activities are append-only; a delete event would be a
                // backing-store anomaly and is ignored. The upsert is keyed
                // by id, so the echo of a locally-inserted row is a no-op.
                match op {
                    RowOp::Delete => MergeReport::skipped(),
                    _ => match self.store.update(task_id, |task| task.upsert_activity(row)) {
                        Some(()) => MergeReport::applied(),
                        None => MergeReport::skipped(),
                    },
                }
            }
            (op, RemoteRow::Attachments(row)) => {
                let key = FieldKey::Attachment(row.id);
                self.merge_child(task_id, key, |task| match op {
                    RowOp::Delete => {
                        task.remove_attachment(row.id);
                    }
                    _ => task.upsert_attachment(row.clone()),
                })
            }
        }
    }

    /// Field-wise merge of a task row: in-flight fields keep their local
    /// value, everything else takes the remote value. An unknown task id
    /// inserts a fresh snapshot (its child rows arrive as their own events).
    fn merge_task_row(&self, row: TaskRow) -> MergeReport {
        let task_id = row.id;
        if !self.store.contains(task_id) {
            self.store.put(row.into_task());
            return MergeReport::applied();
        }

        let mut fields = row.to_fields();
        let mut suppressed = Vec::new();
        for key in self.inflight.inflight_keys(task_id) {
            if fields.clear(key) {
                suppressed.push(key);
            }
        }
        if !suppressed.is_empty() {
            debug!(%task_id, suppressed = ?suppressed.iter().map(|k| k.name()).collect::<Vec<_>>(),
                "remote values deferred for in-flight fields");
        }

        let updated_at = row.updated_at;
        let applied = self
            .store
            .update(task_id, |task| {
                fields.apply_to(task);
                task.updated_at = updated_at;
            })
            .is_some();
        MergeReport {
            applied,
            suppressed,
        }
    }

    /// Replace a task's snapshot with one freshly fetched from the backend,
    /// keeping the local value of any scalar field still in flight. Child
    /// collections are taken wholesale: structural changes persist
    /// immediately and are awaited, so none can be in flight here.
    pub(crate) fn refresh(&self, fresh: Task) -> bool {
        let task_id = fresh.id;
        let Some(local) = self.store.get(task_id) else {
            self.store.put(fresh);
            return true;
        };
        let mut fresh = fresh;
        for key in self.inflight.inflight_keys(task_id) {
            TaskFields::revert_field(&mut fresh, &local, key);
        }
        fresh.pending_delete = local.pending_delete;
        self.store.put(fresh);
        true
    }

    /// Upsert/remove one child row, unless that specific child is in flight
    /// locally. Unknown parents are skipped — the task's own fetch or insert
    /// event delivers the children again.
    fn merge_child(
        &self,
        task_id: Uuid,
        key: FieldKey,
        merge: impl FnOnce(&mut Task),
    ) -> MergeReport {
        if self.inflight.is_inflight(task_id, key) {
            debug!(%task_id, child = key.name(), "remote child row deferred, locally in flight");
            return MergeReport {
                applied: false,
                suppressed: vec![key],
            };
        }
        match self.store.update(task_id, merge) {
            Some(()) => MergeReport::applied(),
            None => {
                debug!(%task_id, child = key.name(), "remote child row for unknown task dropped");
                MergeReport::skipped()
            }
        }
    }
}
