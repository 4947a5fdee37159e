//! Batch file-operation engine for fileferry.
//!
//! This crate drives copy, move and zip tasks over a [`FileStore`]: it
//! resolves source trees, deduplicates destination names, tracks byte-accurate
//! progress and reports it, throttled, to an [`EventSink`].
//!
//! # Overview
//!
//! - [`CopyTask`], [`MoveTask`] and [`ZipTask`] implement the [`Task`] trait
//! - [`execute`] runs one task to exactly one terminal notification
//! - [`OperationManager`] queues tasks and tracks them by id
//!
//! [`FileStore`]: fileferry_core::FileStore

mod copy;
mod dedup;
mod events;
mod limiter;
mod manager;
mod move_op;
mod operation;
mod progress;
mod rate_limit;
mod resolve;
mod speed;
mod task;
mod zip;

pub use copy::CopyTask;
pub use dedup::deduplicate_path;
pub use events::{EntryChangeKind, EventRouter, EventSink};
pub use limiter::ConcurrencyLimiter;
pub use manager::{ManagerStatus, OperationManager, QueuedTask};
pub use move_op::MoveTask;
pub use operation::{OperationError, OperationResult, TaskId};
pub use progress::{OperationType, TaskStatus, TerminalReason};
pub use rate_limit::RateLimiter;
pub use resolve::{DIRECTORY_SIZE, list_entries, resolve_recursively};
pub use speed::Speedometer;
pub use task::{ProcessingEntry, Task, TaskCore, TaskHandle, execute};
pub use zip::ZipTask;

// Re-export core types for convenience
pub use fileferry_core::{
    ArchiveError, Archiver, Entry, EntryId, EntryKind, FileStore, StoreError, TaskConfig,
};

/// Default channel buffer size for copy progress events.
pub const OPERATION_CHANNEL_SIZE: usize = 100;
