//! Data model for the task board synchronization core.
//!
//! The `Task` snapshot owns its nested collections (responsibles, checklists,
//! comments, activities, attachments) for the lifetime of a board view; the
//! remote store is the durable owner. All mutation goes through the pipeline
//! or the remote listener as whole-field replacements, so the per-field
//! in-flight bookkeeping stays correct.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate a new v4 UUID for a locally created row.
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}

// ── Enums ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Human-readable label used in activity descriptions.
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Urgent => "Urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Board column a task lives in. Transitions are unordered — any status is
/// reachable from any other via an explicit user action; this is a workflow
/// convention, not a guarded state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Claimed,
    Executing,
    Completed,
    Validated,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Created => "Created",
            TaskStatus::Claimed => "Claimed",
            TaskStatus::Executing => "Executing",
            TaskStatus::Completed => "Completed",
            TaskStatus::Validated => "Validated",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Short action tag stamped on every audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTag {
    Edited,
    Commented,
    ChangedStatus,
    Archived,
}

// ── Child entities ───────────────────────────────────────────────────────────

/// Who a responsible association points at. A responsible is either a user
/// or a team, never both — the enum makes the exclusivity structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assignee {
    User { user_id: Uuid, name: String },
    Team { team_id: Uuid, name: String },
}

impl Assignee {
    pub fn display_name(&self) -> &str {
        match self {
            Assignee::User { name, .. } | Assignee::Team { name, .. } => name,
        }
    }

    pub fn is_team(&self) -> bool {
        matches!(self, Assignee::Team { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Responsible {
    pub id: Uuid,
    pub task_id: Uuid,
    pub assignee: Assignee,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: Uuid,
    pub checklist_id: Uuid,
    pub content: String,
    pub done: bool,
    /// Ordering within the checklist.
    pub position: i64,
}

/// A checklist belongs to exactly one task and owns its items. Deleting the
/// checklist cascades to the items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub id: Uuid,
    pub task_id: Uuid,
    pub name: String,
    pub items: Vec<ChecklistItem>,
}

/// Immutable once created, except for deletion. Displayed newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub author_id: Uuid,
    pub author_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit record. Never edited or removed by normal operation;
/// generated exactly once per accepted mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Uuid,
    pub task_id: Uuid,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub tag: ActivityTag,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        task_id: Uuid,
        actor_id: Uuid,
        actor_name: impl Into<String>,
        tag: ActivityTag,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            task_id,
            actor_id,
            actor_name: actor_name.into(),
            tag,
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Binary content lives in external storage; only the URL is tracked here.
    Image { url: String },
    Link { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub kind: AttachmentKind,
}

// ── Task ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub status: TaskStatus,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<NaiveTime>,
    pub archived: bool,
    pub elapsed_minutes: i64,
    /// Ordering within the board column.
    pub position: i64,
    pub company_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub responsibles: Vec<Responsible>,
    pub checklists: Vec<Checklist>,
    /// Newest first.
    pub comments: Vec<Comment>,
    pub activities: Vec<Activity>,
    pub attachments: Vec<Attachment>,
    /// Local-only: set while a delete confirmation dialog is open. Blocks
    /// archiving until the delete is confirmed or cancelled. Never persisted.
    #[serde(skip)]
    pub pending_delete: bool,
}

impl Task {
    /// A fresh snapshot with empty child collections, e.g. from a remote
    /// insert event whose child rows have not arrived yet.
    pub fn bare(
        id: Uuid,
        company_id: Uuid,
        title: impl Into<String>,
        status: TaskStatus,
        priority: Priority,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            title: title.into(),
            description: None,
            priority,
            status,
            due_date: None,
            due_time: None,
            archived: false,
            elapsed_minutes: 0,
            position: 0,
            company_id,
            created_at: now,
            updated_at: now,
            responsibles: Vec::new(),
            checklists: Vec::new(),
            comments: Vec::new(),
            activities: Vec::new(),
            attachments: Vec::new(),
            pending_delete: false,
        }
    }
}

// Child-collection merges. Always keyed by child id — never a full-list
// clobber — so a locally-added optimistic row survives a remote event
// describing a different row.
impl Task {
    pub fn upsert_responsible(&mut self, responsible: Responsible) {
        match self.responsibles.iter_mut().find(|r| r.id == responsible.id) {
            Some(existing) => *existing = responsible,
            None => self.responsibles.push(responsible),
        }
    }

    pub fn remove_responsible(&mut self, id: Uuid) -> Option<Responsible> {
        let idx = self.responsibles.iter().position(|r| r.id == id)?;
        Some(self.responsibles.remove(idx))
    }

    /// Insert or replace a comment, keeping newest-first display order.
    pub fn upsert_comment(&mut self, comment: Comment) {
        match self.comments.iter_mut().find(|c| c.id == comment.id) {
            Some(existing) => *existing = comment,
            None => {
                self.comments.push(comment);
                self.comments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            }
        }
    }

    pub fn remove_comment(&mut self, id: Uuid) -> Option<Comment> {
        let idx = self.comments.iter().position(|c| c.id == id)?;
        Some(self.comments.remove(idx))
    }

    /// Append an activity unless a row with the same id is already present —
    /// the local optimistic insert and its remote echo must not duplicate.
    pub fn upsert_activity(&mut self, activity: Activity) {
        match self.activities.iter_mut().find(|a| a.id == activity.id) {
            Some(existing) => *existing = activity,
            None => {
                self.activities.push(activity);
                self.activities.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            }
        }
    }

    pub fn upsert_checklist(&mut self, checklist: Checklist) {
        match self.checklists.iter_mut().find(|c| c.id == checklist.id) {
            Some(existing) => {
                // A bare checklist row from the feed carries no items; keep
                // the ones we already hold.
                let items = std::mem::take(&mut existing.items);
                *existing = checklist;
                if existing.items.is_empty() {
                    existing.items = items;
                }
            }
            None => self.checklists.push(checklist),
        }
    }

    /// Deleting a checklist cascades to its items (they are owned).
    pub fn remove_checklist(&mut self, id: Uuid) -> Option<Checklist> {
        let idx = self.checklists.iter().position(|c| c.id == id)?;
        Some(self.checklists.remove(idx))
    }

    pub fn upsert_checklist_item(&mut self, checklist_id: Uuid, item: ChecklistItem) -> bool {
        let Some(checklist) = self.checklists.iter_mut().find(|c| c.id == checklist_id) else {
            return false;
        };
        match checklist.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => *existing = item,
            None => {
                checklist.items.push(item);
                checklist.items.sort_by_key(|i| i.position);
            }
        }
        true
    }

    pub fn remove_checklist_item(
        &mut self,
        checklist_id: Uuid,
        item_id: Uuid,
    ) -> Option<ChecklistItem> {
        let checklist = self.checklists.iter_mut().find(|c| c.id == checklist_id)?;
        let idx = checklist.items.iter().position(|i| i.id == item_id)?;
        Some(checklist.items.remove(idx))
    }

    /// Flip an item's completion flag. Returns the previous value.
    pub fn set_checklist_item_done(
        &mut self,
        checklist_id: Uuid,
        item_id: Uuid,
        done: bool,
    ) -> Option<bool> {
        let item = self
            .checklists
            .iter_mut()
            .find(|c| c.id == checklist_id)?
            .items
            .iter_mut()
            .find(|i| i.id == item_id)?;
        let was = item.done;
        item.done = done;
        Some(was)
    }

    pub fn upsert_attachment(&mut self, attachment: Attachment) {
        match self.attachments.iter_mut().find(|a| a.id == attachment.id) {
            Some(existing) => *existing = attachment,
            None => self.attachments.push(attachment),
        }
    }

    pub fn remove_attachment(&mut self, id: Uuid) -> Option<Attachment> {
        let idx = self.attachments.iter().position(|a| a.id == id)?;
        Some(self.attachments.remove(idx))
    }
}

// ── Field addressing ─────────────────────────────────────────────────────────

/// Addresses one independently mergeable piece of a task: a scalar field, or
/// a single child row by id. In-flight markers, reverts and remote-merge
/// suppression are all keyed by `FieldKey`, so unrelated fields and unrelated
/// children never interfere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Title,
    Description,
    Priority,
    Status,
    DueDate,
    DueTime,
    Archived,
    ElapsedMinutes,
    Position,
    Responsible(Uuid),
    Checklist(Uuid),
    ChecklistItem(Uuid),
    Comment(Uuid),
    Attachment(Uuid),
}

impl FieldKey {
    /// Stable name for logs and notices.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKey::Title => "title",
            FieldKey::Description => "description",
            FieldKey::Priority => "priority",
            FieldKey::Status => "status",
            FieldKey::DueDate => "due_date",
            FieldKey::DueTime => "due_time",
            FieldKey::Archived => "archived",
            FieldKey::ElapsedMinutes => "elapsed_minutes",
            FieldKey::Position => "position",
            FieldKey::Responsible(_) => "responsible",
            FieldKey::Checklist(_) => "checklist",
            FieldKey::ChecklistItem(_) => "checklist_item",
            FieldKey::Comment(_) => "comment",
            FieldKey::Attachment(_) => "attachment",
        }
    }
}

// ── Shallow patch ────────────────────────────────────────────────────────────

/// A shallow field-level patch. `None` means "not touched"; for nullable
/// fields the inner `Option` carries the new value, so `Some(None)` clears
/// a due date while `None` leaves it alone. A patch never reintroduces
/// fields the caller did not specify.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_time: Option<Option<NaiveTime>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl TaskFields {
    pub fn is_empty(&self) -> bool {
        self.keys().is_empty()
    }

    /// The scalar fields this patch touches.
    pub fn keys(&self) -> Vec<FieldKey> {
        let mut keys = Vec::new();
        if self.title.is_some() {
            keys.push(FieldKey::Title);
        }
        if self.description.is_some() {
            keys.push(FieldKey::Description);
        }
        if self.priority.is_some() {
            keys.push(FieldKey::Priority);
        }
        if self.status.is_some() {
            keys.push(FieldKey::Status);
        }
        if self.due_date.is_some() {
            keys.push(FieldKey::DueDate);
        }
        if self.due_time.is_some() {
            keys.push(FieldKey::DueTime);
        }
        if self.archived.is_some() {
            keys.push(FieldKey::Archived);
        }
        if self.elapsed_minutes.is_some() {
            keys.push(FieldKey::ElapsedMinutes);
        }
        if self.position.is_some() {
            keys.push(FieldKey::Position);
        }
        keys
    }

    /// Merge `other` on top of this patch; later values win per field.
    pub fn merge(&mut self, other: TaskFields) {
        if other.title.is_some() {
            self.title = other.title;
        }
        if other.description.is_some() {
            self.description = other.description;
        }
        if other.priority.is_some() {
            self.priority = other.priority;
        }
        if other.status.is_some() {
            self.status = other.status;
        }
        if other.due_date.is_some() {
            self.due_date = other.due_date;
        }
        if other.due_time.is_some() {
            self.due_time = other.due_time;
        }
        if other.archived.is_some() {
            self.archived = other.archived;
        }
        if other.elapsed_minutes.is_some() {
            self.elapsed_minutes = other.elapsed_minutes;
        }
        if other.position.is_some() {
            self.position = other.position;
        }
    }

    /// Whole-field replacement of every touched field onto `task`.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(due_time) = self.due_time {
            task.due_time = due_time;
        }
        if let Some(archived) = self.archived {
            task.archived = archived;
        }
        if let Some(elapsed) = self.elapsed_minutes {
            task.elapsed_minutes = elapsed;
        }
        if let Some(position) = self.position {
            task.position = position;
        }
    }

    /// Drop one field from the patch. Returns `true` if it was present.
    /// Used by the remote listener to suppress in-flight fields.
    pub fn clear(&mut self, key: FieldKey) -> bool {
        match key {
            FieldKey::Title => self.title.take().is_some(),
            FieldKey::Description => self.description.take().is_some(),
            FieldKey::Priority => self.priority.take().is_some(),
            FieldKey::Status => self.status.take().is_some(),
            FieldKey::DueDate => self.due_date.take().is_some(),
            FieldKey::DueTime => self.due_time.take().is_some(),
            FieldKey::Archived => self.archived.take().is_some(),
            FieldKey::ElapsedMinutes => self.elapsed_minutes.take().is_some(),
            FieldKey::Position => self.position.take().is_some(),
            _ => false,
        }
    }

    /// Copy one field's value out of `pre` into `task` — the per-field revert
    /// primitive. Only the named field is touched.
    pub fn revert_field(task: &mut Task, pre: &Task, key: FieldKey) {
        match key {
            FieldKey::Title => task.title = pre.title.clone(),
            FieldKey::Description => task.description = pre.description.clone(),
            FieldKey::Priority => task.priority = pre.priority,
            FieldKey::Status => task.status = pre.status,
            FieldKey::DueDate => task.due_date = pre.due_date,
            FieldKey::DueTime => task.due_time = pre.due_time,
            FieldKey::Archived => task.archived = pre.archived,
            FieldKey::ElapsedMinutes => task.elapsed_minutes = pre.elapsed_minutes,
            FieldKey::Position => task.position = pre.position,
            // Child rows are reverted structurally by the pipeline.
            _ => {}
        }
    }

    // Convenience builders for the common single-field edits.

    pub fn title(value: impl Into<String>) -> Self {
        Self {
            title: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn description(value: Option<String>) -> Self {
        Self {
            description: Some(value),
            ..Self::default()
        }
    }

    pub fn priority(value: Priority) -> Self {
        Self {
            priority: Some(value),
            ..Self::default()
        }
    }

    pub fn status(value: TaskStatus) -> Self {
        Self {
            status: Some(value),
            ..Self::default()
        }
    }

    pub fn archived(value: bool) -> Self {
        Self {
            archived: Some(value),
            ..Self::default()
        }
    }
}

// ── Structural changes ───────────────────────────────────────────────────────

/// A change to a task's child collections rather than a scalar field. These
/// always persist immediately — the user expects a toggled checklist item or
/// a new comment to be durable before leaving the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StructuralChange {
    AddResponsible(Responsible),
    RemoveResponsible { responsible_id: Uuid },
    AddComment(Comment),
    DeleteComment { comment_id: Uuid },
    AddChecklist(Checklist),
    DeleteChecklist { checklist_id: Uuid },
    AddChecklistItem { checklist_id: Uuid, item: ChecklistItem },
    RemoveChecklistItem { checklist_id: Uuid, item_id: Uuid },
    ToggleChecklistItem { checklist_id: Uuid, item_id: Uuid, done: bool },
    AddAttachment(Attachment),
    RemoveAttachment { attachment_id: Uuid },
}

impl StructuralChange {
    /// The child row this change is keyed on, for in-flight tracking.
    pub fn field_key(&self) -> FieldKey {
        match self {
            StructuralChange::AddResponsible(r) => FieldKey::Responsible(r.id),
            StructuralChange::RemoveResponsible { responsible_id } => {
                FieldKey::Responsible(*responsible_id)
            }
            StructuralChange::AddComment(c) => FieldKey::Comment(c.id),
            StructuralChange::DeleteComment { comment_id } => FieldKey::Comment(*comment_id),
            StructuralChange::AddChecklist(c) => FieldKey::Checklist(c.id),
            StructuralChange::DeleteChecklist { checklist_id } => {
                FieldKey::Checklist(*checklist_id)
            }
            StructuralChange::AddChecklistItem { item, .. } => FieldKey::ChecklistItem(item.id),
            StructuralChange::RemoveChecklistItem { item_id, .. }
            | StructuralChange::ToggleChecklistItem { item_id, .. } => {
                FieldKey::ChecklistItem(*item_id)
            }
            StructuralChange::AddAttachment(a) => FieldKey::Attachment(a.id),
            StructuralChange::RemoveAttachment { attachment_id } => {
                FieldKey::Attachment(*attachment_id)
            }
        }
    }

    /// Optimistic apply to a snapshot. Returns `false` when the referenced
    /// child row does not exist (the pipeline rejects before applying, so
    /// this is a defensive no-op path, not an error path).
    pub fn apply_to(&self, task: &mut Task) -> bool {
        match self {
            StructuralChange::AddResponsible(r) => {
                task.upsert_responsible(r.clone());
                true
            }
            StructuralChange::RemoveResponsible { responsible_id } => {
                task.remove_responsible(*responsible_id).is_some()
            }
            StructuralChange::AddComment(c) => {
                task.upsert_comment(c.clone());
                true
            }
            StructuralChange::DeleteComment { comment_id } => {
                task.remove_comment(*comment_id).is_some()
            }
            StructuralChange::AddChecklist(c) => {
                task.upsert_checklist(c.clone());
                true
            }
            StructuralChange::DeleteChecklist { checklist_id } => {
                task.remove_checklist(*checklist_id).is_some()
            }
            StructuralChange::AddChecklistItem { checklist_id, item } => {
                task.upsert_checklist_item(*checklist_id, item.clone())
            }
            StructuralChange::RemoveChecklistItem {
                checklist_id,
                item_id,
            } => task.remove_checklist_item(*checklist_id, *item_id).is_some(),
            StructuralChange::ToggleChecklistItem {
                checklist_id,
                item_id,
                done,
            } => task
                .set_checklist_item_done(*checklist_id, *item_id, *done)
                .is_some(),
            StructuralChange::AddAttachment(a) => {
                task.upsert_attachment(a.clone());
                true
            }
            StructuralChange::RemoveAttachment { attachment_id } => {
                task.remove_attachment(*attachment_id).is_some()
            }
        }
    }

    /// Undo the optimistic apply using the pre-mutation snapshot. Adds are
    /// removed, removals are re-inserted from `pre`, toggles restore the
    /// prior flag. Only the child row this change touched is affected.
    pub fn revert_on(&self, task: &mut Task, pre: &Task) {
        match self {
            StructuralChange::AddResponsible(r) => {
                task.remove_responsible(r.id);
            }
            StructuralChange::RemoveResponsible { responsible_id } => {
                if let Some(prev) = pre.responsibles.iter().find(|r| r.id == *responsible_id) {
                    task.upsert_responsible(prev.clone());
                }
            }
            StructuralChange::AddComment(c) => {
                task.remove_comment(c.id);
            }
            StructuralChange::DeleteComment { comment_id } => {
                if let Some(prev) = pre.comments.iter().find(|c| c.id == *comment_id) {
                    task.upsert_comment(prev.clone());
                }
            }
            StructuralChange::AddChecklist(c) => {
                task.remove_checklist(c.id);
            }
            StructuralChange::DeleteChecklist { checklist_id } => {
                if let Some(prev) = pre.checklists.iter().find(|c| c.id == *checklist_id) {
                    task.upsert_checklist(prev.clone());
                }
            }
            StructuralChange::AddChecklistItem { checklist_id, item } => {
                task.remove_checklist_item(*checklist_id, item.id);
            }
            StructuralChange::RemoveChecklistItem {
                checklist_id,
                item_id,
            } => {
                if let Some(prev) = pre
                    .checklists
                    .iter()
                    .find(|c| c.id == *checklist_id)
                    .and_then(|c| c.items.iter().find(|i| i.id == *item_id))
                {
                    task.upsert_checklist_item(*checklist_id, prev.clone());
                }
            }
            StructuralChange::ToggleChecklistItem {
                checklist_id,
                item_id,
                ..
            } => {
                if let Some(prev) = pre
                    .checklists
                    .iter()
                    .find(|c| c.id == *checklist_id)
                    .and_then(|c| c.items.iter().find(|i| i.id == *item_id))
                {
                    task.set_checklist_item_done(*checklist_id, *item_id, prev.done);
                }
            }
            StructuralChange::AddAttachment(a) => {
                task.remove_attachment(a.id);
            }
            StructuralChange::RemoveAttachment { attachment_id } => {
                if let Some(prev) = pre.attachments.iter().find(|a| a.id == *attachment_id) {
                    task.upsert_attachment(prev.clone());
                }
            }
        }
    }
}

/// One field-level or structural mutation, as accepted by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskChange {
    Fields(TaskFields),
    Structural(StructuralChange),
}
