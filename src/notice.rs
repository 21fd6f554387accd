//! User-facing notices.
//!
//! Validation and persistence failures are surfaced to the presentation
//! layer on a broadcast channel; suppressed remote fields are not (they are
//! a silent merge deferral, logged at debug level by the listener).

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// A notice the presentation layer should show to the user.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    ValidationFailed {
        task_id: Uuid,
        message: String,
    },
    /// A remote write failed after an optimistic apply; the named fields
    /// were reverted to their pre-mutation values and may be retried.
    PersistenceFailed {
        task_id: Uuid,
        fields: Vec<String>,
        message: String,
    },
}

/// Broadcasts notices to all subscribed views.
#[derive(Clone)]
pub struct NoticeBroadcaster {
    tx: broadcast::Sender<Notice>,
}

impl NoticeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn validation_failed(&self, task_id: Uuid, message: impl Into<String>) {
        // No subscribers is fine.
        let _ = self.tx.send(Notice::ValidationFailed {
            task_id,
            message: message.into(),
        });
    }

    pub fn persistence_failed(
        &self,
        task_id: Uuid,
        fields: Vec<String>,
        message: impl Into<String>,
    ) {
        let _ = self.tx.send(Notice::PersistenceFailed {
            task_id,
            fields,
            message: message.into(),
        });
    }
}
