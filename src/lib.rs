//! boardsync — task board synchronization core.
//!
//! Keeps an in-memory board consistent while the local user edits task
//! fields optimistically, edits persist after a debounce window, other
//! actors push concurrent change events, and every accepted mutation
//! appends exactly one set of audit entries.
//!
//! The moving parts, leaf first:
//!
//! - [`store::SnapshotStore`] — the authoritative in-memory copy of each
//!   task, read by views via `get`/`subscribe`.
//! - [`pipeline::MutationPipeline`] — validates, applies optimistically,
//!   tracks per-field in-flight sequence numbers, persists immediately or
//!   through the scheduler, reverts per field on failure.
//! - [`debounce::CoalescingScheduler`] — merges rapid edits to one task
//!   into a single persistence call after an idle window.
//! - [`remote::RemoteChangeListener`] — merges server-pushed row events
//!   without clobbering in-flight local edits.
//! - [`board::BoardSession`] — owns and wires the above for one open view;
//!   exposes status drags, archiving, delete confirmation and teardown.
//! - [`activity`] — pure snapshot diffing into human-readable audit strings.
//!
//! Persistence and identity are external collaborators behind the traits in
//! [`backend`]; this crate performs no I/O of its own.

pub mod activity;
pub mod backend;
pub mod board;
pub mod config;
pub mod debounce;
pub mod error;
pub mod model;
pub mod notice;
pub mod pipeline;
pub mod remote;
pub mod store;

pub use backend::{
    Actor, Identity, MemoryBackend, RemoteEvent, RemoteRow, RowOp, StaticIdentity, TaskBackend,
};
pub use board::BoardSession;
pub use config::SyncConfig;
pub use error::{MutationOutcome, SyncError, ValidationError};
pub use model::{
    Activity, ActivityTag, Assignee, Attachment, AttachmentKind, Checklist, ChecklistItem,
    Comment, FieldKey, Priority, Responsible, StructuralChange, Task, TaskChange, TaskFields,
    TaskStatus,
};
pub use notice::Notice;
pub use pipeline::{MutateOptions, MutationPipeline};
pub use store::{SnapshotStore, StoreEvent, StoreEventKind};
