//! Event dispatching towards the host.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use fileferry_core::{Entry, EntryId, TaskConfig};

use crate::{OperationError, RateLimiter, TaskId, TaskStatus, TerminalReason};

/// Kind of entry change reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryChangeKind {
    Created,
    Deleted,
}

/// Receiver of task notifications, implemented by the host.
pub trait EventSink: Send + Sync {
    /// A task finished initializing and is about to run.
    fn on_begin(&self, _task_id: &TaskId, _status: &TaskStatus) {}

    /// A task made progress.
    fn on_progress(&self, task_id: &TaskId, status: &TaskStatus);

    /// A batch of entries was created or deleted.
    fn on_entry_changed(&self, kind: EntryChangeKind, entries: &[Entry]);

    /// A task ended. `error` is set for [`TerminalReason::Error`] and carries
    /// the abort error for [`TerminalReason::Cancelled`] when one was raised.
    fn on_terminal(
        &self,
        task_id: &TaskId,
        reason: TerminalReason,
        status: &TaskStatus,
        error: Option<&OperationError>,
    );
}

#[derive(Default)]
struct PendingEntries {
    created: IndexMap<EntryId, Entry>,
    deleted: IndexMap<EntryId, Entry>,
}

struct Router {
    sink: Arc<dyn EventSink>,
    pending: Mutex<PendingEntries>,
    /// Held while a batch is taken and delivered, so batches reach the sink
    /// one at a time and in order.
    dispatching: Mutex<()>,
    flush: RateLimiter,
}

impl Router {
    fn dispatch_entry_changed(&self) {
        let _dispatching = self
            .dispatching
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let pending = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *pending)
        };

        if !pending.created.is_empty() {
            let entries: Vec<Entry> = pending.created.into_values().collect();
            self.sink.on_entry_changed(EntryChangeKind::Created, &entries);
        }
        if !pending.deleted.is_empty() {
            let entries: Vec<Entry> = pending.deleted.into_values().collect();
            self.sink.on_entry_changed(EntryChangeKind::Deleted, &entries);
        }
    }
}

/// Routes task notifications to an [`EventSink`].
///
/// Entry changes are buffered into two sets keyed by entry id, so repeated
/// updates of one entry within a batching window collapse into its latest
/// state. Batches are flushed by a rate limiter, and right away when a task
/// succeeds or is cancelled.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<Router>,
}

impl EventRouter {
    /// Create a router batching entry changes over `entry_changed_interval`.
    pub fn new(sink: Arc<dyn EventSink>, entry_changed_interval: Duration) -> Self {
        let inner = Arc::new_cyclic(|router: &Weak<Router>| {
            let router = router.clone();
            Router {
                sink,
                pending: Mutex::new(PendingEntries::default()),
                dispatching: Mutex::new(()),
                flush: RateLimiter::new(entry_changed_interval, move || {
                    if let Some(router) = router.upgrade() {
                        router.dispatch_entry_changed();
                    }
                }),
            }
        });
        Self { inner }
    }

    /// Create a router using the intervals of `config`.
    pub fn with_config(sink: Arc<dyn EventSink>, config: &TaskConfig) -> Self {
        Self::new(sink, config.entry_changed_interval())
    }

    /// Notify that a task is about to run.
    pub fn send_begin(&self, task_id: &TaskId, status: &TaskStatus) {
        self.inner.sink.on_begin(task_id, status);
    }

    /// Notify task progress.
    pub fn send_progress(&self, task_id: &TaskId, status: &TaskStatus) {
        self.inner.sink.on_progress(task_id, status);
    }

    /// Buffer an entry change for the next batch.
    pub fn send_entry_changed(&self, kind: EntryChangeKind, entry: Entry) {
        {
            let mut pending = self
                .inner
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let set = match kind {
                EntryChangeKind::Created => &mut pending.created,
                EntryChangeKind::Deleted => &mut pending.deleted,
            };
            set.insert(entry.id.clone(), entry);
        }
        self.inner.flush.schedule();
    }

    /// Notify that a task ended.
    pub fn send_terminal(
        &self,
        task_id: &TaskId,
        reason: TerminalReason,
        status: &TaskStatus,
        error: Option<&OperationError>,
    ) {
        // Pending entry changes go out before the final notification.
        if matches!(reason, TerminalReason::Success | TerminalReason::Cancelled) {
            self.flush();
        }
        self.inner.sink.on_terminal(task_id, reason, status, error);
    }

    /// Dispatch the pending entry-changed batch now.
    ///
    /// Returns once every batch taken so far, including one a throttled run
    /// is delivering concurrently, has reached the sink.
    pub fn flush(&self) {
        self.inner.flush.cancel();
        self.inner.dispatch_entry_changed();
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("flush", &self.inner.flush)
            .finish_non_exhaustive()
    }
}
