//! External collaborator seams.
//!
//! The synchronization core talks to the outside world through two narrow
//! interfaces: a persistence backend doing row-level writes keyed by task id,
//! and an identity source naming the current actor for audit stamps. The
//! backend also defines the typed payloads of the remote change feed — the
//! `(table, operation, row)` events the backing store pushes for the task
//! table and its child tables.
//!
//! `MemoryBackend` is the in-process implementation used by tests and demos:
//! it records every call and supports failure injection and artificial
//! latency per persistence call.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    Activity, Attachment, Comment, Priority, Responsible, StructuralChange, Task, TaskFields,
    TaskStatus,
};

// ── Identity ─────────────────────────────────────────────────────────────────

/// The current actor, stamped onto activity records and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
}

/// Identity collaborator. Sessions are single-actor, so this is a plain
/// synchronous lookup.
pub trait Identity: Send + Sync {
    fn actor(&self) -> Actor;
}

/// Fixed actor for the lifetime of a session.
pub struct StaticIdentity {
    actor: Actor,
}

impl StaticIdentity {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            actor: Actor {
                id,
                name: name.into(),
            },
        }
    }
}

impl Identity for StaticIdentity {
    fn actor(&self) -> Actor {
        self.actor.clone()
    }
}

// ── Persistence backend ──────────────────────────────────────────────────────

/// Row-level persistence operations, keyed by task identifier. Implementations
/// may return any error; the pipeline maps failures to its persistence-error
/// handling (per-field revert plus a user notice).
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// All unarchived tasks of a tenant, with child rows resolved.
    async fn fetch_board(&self, company_id: Uuid) -> Result<Vec<Task>>;

    /// One task with child rows resolved, or `None` if it no longer exists.
    async fn fetch_task(&self, task_id: Uuid) -> Result<Option<Task>>;

    /// Persist a field-level patch. The remote store is last-writer-wins at
    /// the row level; the patch carries only the touched fields.
    async fn update_task(&self, task_id: Uuid, fields: &TaskFields) -> Result<()>;

    /// Persist a child-row insert/update/delete.
    async fn apply_structural(&self, task_id: Uuid, change: &StructuralChange) -> Result<()>;

    /// Append one audit row.
    async fn insert_activity(&self, activity: &Activity) -> Result<()>;

    /// Delete the task row (child rows cascade server-side).
    async fn delete_task(&self, task_id: Uuid) -> Result<()>;
}

pub type SharedBackend = Arc<dyn TaskBackend>;

// ── Remote change feed ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOp {
    Insert,
    Update,
    Delete,
}

/// Scalar columns of the task table as they appear on the feed. Child rows
/// arrive as their own table events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: Uuid,
    pub company_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    pub archived: bool,
    pub elapsed_minutes: i64,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRow {
    /// The row as a full-cover patch, for field-wise merging.
    pub fn to_fields(&self) -> TaskFields {
        TaskFields {
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            priority: Some(self.priority),
            status: Some(self.status),
            due_date: Some(self.due_date),
            due_time: Some(self.due_time),
            archived: Some(self.archived),
            elapsed_minutes: Some(self.elapsed_minutes),
            position: Some(self.position),
        }
    }

    /// A fresh snapshot for a task first seen through the feed. Child rows
    /// fill in as their own events arrive.
    pub fn into_task(self) -> Task {
        let mut task = Task::bare(self.id, self.company_id, "", self.status, self.priority);
        task.created_at = self.created_at;
        task.updated_at = self.updated_at;
        self.to_fields().apply_to(&mut task);
        task
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistRow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItemRow {
    pub id: Uuid,
    pub task_id: Uuid,
    pub checklist_id: Uuid,
    pub content: String,
    pub done: bool,
    pub position: i64,
}

/// One changed row, tagged by table. Matches the feed's `(table, op, row)`
/// triple: `op` travels alongside in `RemoteEvent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "table", content = "row", rename_all = "snake_case")]
pub enum RemoteRow {
    Tasks(TaskRow),
    Responsibles(Responsible),
    Checklists(ChecklistRow),
    ChecklistItems(ChecklistItemRow),
    Comments(Comment),
    Activities(Activity),
    Attachments(Attachment),
}

impl RemoteRow {
    /// The task this row belongs to.
    pub fn task_id(&self) -> Uuid {
        match self {
            RemoteRow::Tasks(row) => row.id,
            RemoteRow::Responsibles(row) => row.task_id,
            RemoteRow::Checklists(row) => row.task_id,
            RemoteRow::ChecklistItems(row) => row.task_id,
            RemoteRow::Comments(row) => row.task_id,
            RemoteRow::Activities(row) => row.task_id,
            RemoteRow::Attachments(row) => row.task_id,
        }
    }
}

/// An asynchronous notification that a row changed in the backing store,
/// possibly caused by another user or session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteEvent {
    pub op: RowOp,
    #[serde(flatten)]
    pub row: RemoteRow,
}

impl RemoteEvent {
    pub fn new(op: RowOp, row: RemoteRow) -> Self {
        Self { op, row }
    }
}

// ── In-memory backend ────────────────────────────────────────────────────────

/// One persistence call, as recorded by `MemoryBackend`.
#[derive(Debug, Clone)]
pub enum BackendCall {
    FetchBoard { company_id: Uuid },
    FetchTask { task_id: Uuid },
    UpdateTask { task_id: Uuid, fields: TaskFields },
    Structural { task_id: Uuid, change: StructuralChange },
    InsertActivity(Activity),
    DeleteTask { task_id: Uuid },
}

/// Behavior of one upcoming `update_task` call. Plans are consumed FIFO;
/// calls beyond the queue succeed instantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdatePlan {
    pub delay_ms: u64,
    pub fail: bool,
}

impl UpdatePlan {
    pub fn fail_after(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            fail: true,
        }
    }

    pub fn ok_after(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            fail: false,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    tasks: HashMap<Uuid, Task>,
    calls: Vec<BackendCall>,
    update_plans: VecDeque<UpdatePlan>,
    fail_structural: usize,
    fail_delete: usize,
    fail_activity: usize,
}

/// In-process backend with call recording and failure injection.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a task row (and its child rows) as if it already existed remotely.
    pub fn seed(&self, task: Task) {
        self.lock().tasks.insert(task.id, task);
    }

    /// Plan the next `update_task` calls. Unplanned calls succeed instantly.
    pub fn plan_update(&self, plan: UpdatePlan) {
        self.lock().update_plans.push_back(plan);
    }

    /// Fail the next `n` `update_task` calls instantly.
    pub fn fail_next_updates(&self, n: usize) {
        let mut state = self.lock();
        for _ in 0..n {
            state.update_plans.push_back(UpdatePlan {
                delay_ms: 0,
                fail: true,
            });
        }
    }

    pub fn fail_next_structural(&self, n: usize) {
        self.lock().fail_structural += n;
    }

    pub fn fail_next_deletes(&self, n: usize) {
        self.lock().fail_delete += n;
    }

    pub fn fail_next_activities(&self, n: usize) {
        self.lock().fail_activity += n;
    }

    /// Every call recorded so far.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// The field patches persisted for one task, in call order.
    pub fn update_calls(&self, task_id: Uuid) -> Vec<TaskFields> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::UpdateTask { task_id: id, fields } if *id == task_id => {
                    Some(fields.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Activity rows persisted for one task, in call order.
    pub fn activities(&self, task_id: Uuid) -> Vec<Activity> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::InsertActivity(a) if a.task_id == task_id => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    /// Current remote value of a task row, if any.
    pub fn task(&self, task_id: Uuid) -> Option<Task> {
        self.lock().tasks.get(&task_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl TaskBackend for MemoryBackend {
    async fn fetch_board(&self, company_id: Uuid) -> Result<Vec<Task>> {
        let mut state = self.lock();
        state.calls.push(BackendCall::FetchBoard { company_id });
        Ok(state
            .tasks
            .values()
            .filter(|t| t.company_id == company_id && !t.archived)
            .cloned()
            .collect())
    }

    async fn fetch_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let mut state = self.lock();
        state.calls.push(BackendCall::FetchTask { task_id });
        Ok(state.tasks.get(&task_id).cloned())
    }

    async fn update_task(&self, task_id: Uuid, fields: &TaskFields) -> Result<()> {
        let plan = {
            let mut state = self.lock();
            state.calls.push(BackendCall::UpdateTask {
                task_id,
                fields: fields.clone(),
            });
            state.update_plans.pop_front().unwrap_or_default()
        };
        if plan.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(plan.delay_ms)).await;
        }
        if plan.fail {
            bail!("injected update failure");
        }
        let mut state = self.lock();
        if let Some(task) = state.tasks.get_mut(&task_id) {
            fields.apply_to(task);
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn apply_structural(&self, task_id: Uuid, change: &StructuralChange) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::Structural {
            task_id,
            change: change.clone(),
        });
        if state.fail_structural > 0 {
            state.fail_structural -= 1;
            bail!("injected structural failure");
        }
        if let Some(task) = state.tasks.get_mut(&task_id) {
            change.apply_to(task);
        }
        Ok(())
    }

    async fn insert_activity(&self, activity: &Activity) -> Result<()> {
        let mut state = self.lock();
        if state.fail_activity > 0 {
            state.fail_activity -= 1;
            bail!("injected activity failure");
        }
        state.calls.push(BackendCall::InsertActivity(activity.clone()));
        if let Some(task) = state.tasks.get_mut(&activity.task_id) {
            task.upsert_activity(activity.clone());
        }
        Ok(())
    }

    async fn delete_task(&self, task_id: Uuid) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(BackendCall::DeleteTask { task_id });
        if state.fail_delete > 0 {
            state.fail_delete -= 1;
            bail!("injected delete failure");
        }
        state.tasks.remove(&task_id);
        Ok(())
    }
}
