//! Error taxonomy for the synchronization core.
//!
//! Nothing here is fatal: a validation failure rejects a mutation before any
//! optimistic apply, a persistence failure reverts exactly the fields the
//! failed mutation touched, and the board stays interactive throughout.

use uuid::Uuid;

/// Rejected before any optimistic apply — the snapshot store is untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title cannot be empty")]
    EmptyTitle,
    #[error("unknown task: {0}")]
    UnknownTask(Uuid),
    #[error("task has a pending delete confirmation")]
    PendingDelete,
    #[error("unknown {kind}: {id}")]
    UnknownChild { kind: &'static str, id: Uuid },
    #[error("change is empty")]
    EmptyChange,
}

/// Top-level error for fallible session operations (initial load, teardown).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("persistence failed: {source}")]
    Persistence {
        #[source]
        source: anyhow::Error,
    },
}

impl SyncError {
    pub fn persistence(source: anyhow::Error) -> Self {
        Self::Persistence { source }
    }
}

/// The outcome of a `mutate` call, explicit so callers and tests can assert
/// without racing timers.
///
/// Debounced mutations report `Applied` on acceptance; their persistence
/// round-trip resolves later and any failure is surfaced on the notice
/// channel after the per-field revert.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// Optimistically applied; persisted (immediate) or scheduled (debounced).
    Applied,
    /// Persistence failed; the touched fields were reverted to their
    /// pre-mutation values.
    Reverted(String),
    /// Rejected before any optimistic apply.
    Rejected(ValidationError),
}

impl MutationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied)
    }
}
