//! Task snapshot store.
//!
//! The authoritative in-memory copy of every task on the board, keyed by id.
//! Intentionally dumb: no network access and no opinion on optimism,
//! debouncing or conflict — those live in the mutation pipeline and the
//! remote listener, the only two writers. Views read with `get` and
//! invalidate on `subscribe` events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{Task, TaskFields};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreEventKind {
    Inserted,
    Updated,
    Removed,
}

/// Invalidation event for subscribed views.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreEvent {
    pub task_id: Uuid,
    pub kind: StoreEventKind,
}

pub struct SnapshotStore {
    // Held only for the duration of a map operation, never across an await.
    tasks: Mutex<HashMap<Uuid, Task>>,
    tx: broadcast::Sender<StoreEvent>,
}

/// Thread-safe handle shared by the pipeline, the listener and the views.
pub type SharedSnapshotStore = Arc<SnapshotStore>;

impl SnapshotStore {
    pub fn new(event_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(event_capacity);
        Self {
            tasks: Mutex::new(HashMap::new()),
            tx,
        }
    }

    pub fn get(&self, task_id: Uuid) -> Option<Task> {
        self.lock().get(&task_id).cloned()
    }

    pub fn contains(&self, task_id: Uuid) -> bool {
        self.lock().contains_key(&task_id)
    }

    /// Full replace of a task snapshot.
    pub fn put(&self, task: Task) {
        let task_id = task.id;
        let kind = {
            let mut tasks = self.lock();
            let existed = tasks.insert(task_id, task).is_some();
            if existed {
                StoreEventKind::Updated
            } else {
                StoreEventKind::Inserted
            }
        };
        self.notify(task_id, kind);
    }

    /// Shallow merge of the given fields onto an existing snapshot. Fields
    /// the patch does not specify are never touched. Returns `false` when
    /// the task is absent.
    pub fn patch(&self, task_id: Uuid, fields: &TaskFields) -> bool {
        let patched = {
            let mut tasks = self.lock();
            match tasks.get_mut(&task_id) {
                Some(task) => {
                    fields.apply_to(task);
                    task.updated_at = chrono::Utc::now();
                    true
                }
                None => false,
            }
        };
        if patched {
            self.notify(task_id, StoreEventKind::Updated);
        }
        patched
    }

    pub fn remove(&self, task_id: Uuid) -> Option<Task> {
        let removed = self.lock().remove(&task_id);
        if removed.is_some() {
            self.notify(task_id, StoreEventKind::Removed);
        }
        removed
    }

    /// Every snapshot currently held, in no particular order.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Subscribe to invalidation events for all tasks.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// In-place edit used by the pipeline and the remote listener for child
    /// collections and bookkeeping fields. Not part of the presentation
    /// contract — views never write the store.
    pub(crate) fn update<R>(&self, task_id: Uuid, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        let result = {
            let mut tasks = self.lock();
            tasks.get_mut(&task_id).map(f)
        };
        if result.is_some() {
            self.notify(task_id, StoreEventKind::Updated);
        }
        result
    }

    fn notify(&self, task_id: Uuid, kind: StoreEventKind) {
        // No subscribers is fine.
        let _ = self.tx.send(StoreEvent { task_id, kind });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Task>> {
        // The store mutex is never held across an await and the closures
        // passed to `update` do not panic mid-edit in practice; poisoning
        // would only propagate an already-fatal bug.
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
