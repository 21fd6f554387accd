//! Coalescing scheduler.
//!
//! Debounces rapid successive edits to the same task into a single
//! persistence call: each `schedule` merges the new fields into a per-task
//! buffer and pushes the idle deadline out; when the deadline passes with no
//! further edits the buffer is flushed as one batch. Teardown forces an
//! immediate flush — buffered edits are never silently dropped.
//!
//! At most one flush is in flight per task. A `schedule` arriving during a
//! flush accumulates into a fresh buffer that is flushed after the current
//! one completes, never racing it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tracing::debug;
use uuid::Uuid;

use crate::model::{FieldKey, Task, TaskFields};

/// A coalesced batch handed to the flush sink: the net field patch, the
/// snapshot taken before the first buffered edit (for diffing and revert),
/// and the in-flight sequence number each field was marked with.
#[derive(Debug, Clone)]
pub struct FlushBatch {
    pub first_pre: Task,
    pub fields: TaskFields,
    pub seqs: HashMap<FieldKey, u64>,
}

impl FlushBatch {
    pub fn new(first_pre: Task, fields: TaskFields, seq: u64) -> Self {
        let seqs = fields.keys().into_iter().map(|k| (k, seq)).collect();
        Self {
            first_pre,
            fields,
            seqs,
        }
    }

    /// Merge a later edit into the batch. Each touched field takes the newer
    /// sequence number; the batch keeps its pre-snapshot for fields already
    /// buffered (the flush describes the net change from first-pre to
    /// last-post). A field this edit touches for the first time takes its
    /// pre value from `pre` instead — a remote merge may have updated it
    /// since the buffer opened, and a failure revert must restore that
    /// value, not the stale one from when the buffer opened.
    pub fn absorb(&mut self, pre: &Task, fields: TaskFields, seq: u64) {
        for key in fields.keys() {
            if !self.seqs.contains_key(&key) {
                TaskFields::revert_field(&mut self.first_pre, pre, key);
            }
            self.seqs.insert(key, seq);
        }
        self.fields.merge(fields);
    }
}

/// Receives flushed batches. Implemented by the mutation pipeline's commit
/// path; the scheduler has no opinion on persistence or reverts.
#[async_trait]
pub trait FlushSink: Send + Sync + 'static {
    async fn flush(&self, task_id: Uuid, batch: FlushBatch);
}

struct Pending {
    batch: Option<FlushBatch>,
    deadline: Instant,
    timer_armed: bool,
    flushing: bool,
}

pub struct CoalescingScheduler {
    window: Duration,
    sink: Arc<dyn FlushSink>,
    state: Mutex<HashMap<Uuid, Pending>>,
    flush_done: Notify,
}

impl CoalescingScheduler {
    pub fn new(window: Duration, sink: Arc<dyn FlushSink>) -> Self {
        Self {
            window,
            sink,
            state: Mutex::new(HashMap::new()),
            flush_done: Notify::new(),
        }
    }

    /// Merge an edit into the task's pending buffer and (re)start the idle
    /// timer. `pre` is the snapshot captured before this edit's optimistic
    /// apply; it becomes the batch's pre-snapshot only if the buffer was
    /// empty.
    pub fn schedule(self: &Arc<Self>, task_id: Uuid, pre: Task, fields: TaskFields, seq: u64) {
        let arm = {
            let mut state = self.lock();
            let deadline = Instant::now() + self.window;
            let entry = state.entry(task_id).or_insert_with(|| Pending {
                batch: None,
                deadline,
                timer_armed: false,
                flushing: false,
            });
            entry.deadline = deadline;
            match &mut entry.batch {
                Some(batch) => batch.absorb(&pre, fields, seq),
                None => entry.batch = Some(FlushBatch::new(pre, fields, seq)),
            }
            if entry.timer_armed {
                false
            } else {
                entry.timer_armed = true;
                true
            }
        };
        if arm {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move { scheduler.run_timer(task_id).await });
        }
    }

    /// Drop the named fields from the task's pending buffer. Used by the
    /// immediate persistence path: a newer immediate write of a field must
    /// not be followed by a stale buffered flush of the same field — the
    /// remote store is last-writer-wins at the row level, so the stale
    /// flush would win durably. An emptied buffer is discarded.
    pub fn discard_fields(&self, task_id: Uuid, keys: &[FieldKey]) {
        let mut state = self.lock();
        let Some(p) = state.get_mut(&task_id) else {
            return;
        };
        let Some(batch) = &mut p.batch else {
            return;
        };
        for &key in keys {
            batch.fields.clear(key);
            batch.seqs.remove(&key);
        }
        if batch.fields.is_empty() {
            p.batch = None;
            if !p.timer_armed && !p.flushing {
                state.remove(&task_id);
            }
        }
    }

    /// Whether the task has buffered or currently-flushing edits.
    pub fn is_dirty(&self, task_id: Uuid) -> bool {
        self.lock()
            .get(&task_id)
            .map(|p| p.batch.is_some() || p.flushing)
            .unwrap_or(false)
    }

    /// Force the task's buffer out now, waiting for any in-flight flush
    /// first. Returns once the task has no buffered edits left.
    pub async fn flush_task(&self, task_id: Uuid) {
        loop {
            enum Action {
                Flush(FlushBatch),
                Wait,
                Done,
            }
            let action = {
                let mut state = self.lock();
                match state.get_mut(&task_id) {
                    None => Action::Done,
                    Some(p) if p.flushing => Action::Wait,
                    Some(p) => match p.batch.take() {
                        Some(batch) => {
                            p.flushing = true;
                            Action::Flush(batch)
                        }
                        None => {
                            state.remove(&task_id);
                            Action::Done
                        }
                    },
                }
            };
            match action {
                Action::Done => return,
                Action::Wait => {
                    let notified = self.flush_done.notified();
                    tokio::pin!(notified);
                    notified.as_mut().enable();
                    // Re-check after registering so a completion between the
                    // lock and the await is not lost.
                    let still_flushing = self
                        .lock()
                        .get(&task_id)
                        .map(|p| p.flushing)
                        .unwrap_or(false);
                    if still_flushing {
                        notified.await;
                    }
                }
                Action::Flush(batch) => {
                    debug!(%task_id, "forced flush of pending edits");
                    self.sink.flush(task_id, batch).await;
                    // Not the timer path: the loop itself drains any buffer
                    // that refilled during the flush, so no re-arm here.
                    self.complete_flush(task_id, false);
                }
            }
        }
    }

    /// Flush every dirty task. Teardown path: partial edits must never be
    /// lost when the view closes.
    pub async fn flush_all(&self) {
        let dirty: Vec<Uuid> = self.lock().keys().copied().collect();
        for task_id in dirty {
            self.flush_task(task_id).await;
        }
    }

    async fn run_timer(self: Arc<Self>, task_id: Uuid) {
        loop {
            let deadline = {
                let state = self.lock();
                match state.get(&task_id) {
                    Some(p) if p.timer_armed => p.deadline,
                    _ => return,
                }
            };
            sleep_until(deadline).await;

            let batch = {
                let mut state = self.lock();
                let Some(p) = state.get_mut(&task_id) else {
                    return;
                };
                // A later schedule pushed the deadline out while we slept.
                if Instant::now() < p.deadline {
                    continue;
                }
                p.timer_armed = false;
                if p.flushing {
                    // The in-flight flush's completion re-arms if needed.
                    return;
                }
                match p.batch.take() {
                    Some(batch) => {
                        p.flushing = true;
                        batch
                    }
                    None => {
                        state.remove(&task_id);
                        return;
                    }
                }
            };

            debug!(%task_id, "debounce window elapsed, flushing");
            self.sink.flush(task_id, batch).await;
            if !self.complete_flush(task_id, true) {
                return;
            }
            // Buffer refilled during the flush; loop to honor its deadline.
        }
    }

    /// Mark the task's flush finished. When called from the timer loop
    /// (`from_timer`), decides whether that loop should keep running for a
    /// buffer that refilled mid-flight.
    fn complete_flush(&self, task_id: Uuid, from_timer: bool) -> bool {
        let rearm = {
            let mut state = self.lock();
            let Some(p) = state.get_mut(&task_id) else {
                self.flush_done.notify_waiters();
                return false;
            };
            p.flushing = false;
            if from_timer && p.batch.is_some() && !p.timer_armed {
                p.timer_armed = true;
                true
            } else {
                if p.batch.is_none() && !p.timer_armed {
                    state.remove(&task_id);
                }
                false
            }
        };
        self.flush_done.notify_waiters();
        rearm
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Pending>> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
