//! Host-facing task queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use fileferry_core::{Archiver, Entry, FileStore, TaskConfig};

use crate::{
    CopyTask, EventRouter, EventSink, MoveTask, OperationType, Task, TaskHandle, TaskId,
    TaskStatus, TerminalReason, ZipTask, execute,
};

const TASK_ID_PREFIX: &str = "file-operation-";

/// Aggregated progress of every live task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStatus {
    /// Operation type shared by all live tasks; `None` when idle or mixed.
    pub operation_type: Option<OperationType>,
    /// Number of live tasks.
    pub num_tasks: usize,
    pub num_remaining_items: usize,
    pub total_bytes: u64,
    pub processed_bytes: u64,
}

/// A task spawned by the [`OperationManager`].
#[derive(Debug)]
pub struct QueuedTask {
    pub handle: TaskHandle,
    pub join: JoinHandle<TerminalReason>,
}

impl QueuedTask {
    pub fn task_id(&self) -> &TaskId {
        self.handle.task_id()
    }

    /// Wait for the task to end.
    pub async fn wait(self) -> TerminalReason {
        match self.join.await {
            Ok(reason) => reason,
            Err(error) => {
                warn!(task_id = %self.handle.task_id(), %error, "Task did not run to completion");
                TerminalReason::Error
            }
        }
    }
}

/// Creates tasks for paste and zip requests and runs them.
///
/// Every task is spawned onto the tokio runtime as soon as it is created and
/// runs concurrently with the others. Live tasks are tracked by id until they
/// reach their terminal state. Methods spawning tasks must be called from
/// within a tokio runtime.
pub struct OperationManager {
    store: Arc<dyn FileStore>,
    archiver: Arc<dyn Archiver>,
    events: EventRouter,
    config: TaskConfig,
    tasks: Arc<DashMap<TaskId, TaskHandle>>,
    next_task_id: AtomicU64,
}

impl OperationManager {
    pub fn new(
        store: Arc<dyn FileStore>,
        archiver: Arc<dyn Archiver>,
        sink: Arc<dyn EventSink>,
        config: TaskConfig,
    ) -> Self {
        Self {
            events: EventRouter::with_config(sink, &config),
            store,
            archiver,
            config,
            tasks: Arc::new(DashMap::new()),
            next_task_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    fn generate_task_id(&self) -> TaskId {
        let n = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        TaskId::new(format!("{TASK_ID_PREFIX}{n}"))
    }

    /// Copy or move `sources` into `target_dir`.
    ///
    /// Moving an entry into the directory it already lives in is a no-op, so
    /// such sources are dropped. Moves use atomic renames when the store
    /// allows it and copy+delete otherwise. Returns `None` when nothing is
    /// left to do.
    pub fn paste(&self, sources: Vec<Entry>, target_dir: Entry, is_move: bool) -> Option<QueuedTask> {
        let sources: Vec<Entry> = if is_move {
            sources
                .into_iter()
                .filter(|source| !is_direct_child(source, &target_dir))
                .collect()
        } else {
            sources
        };
        let first = sources.first()?;
        let movable = is_move && self.store.is_movable(first, &target_dir);

        let task_id = self.generate_task_id();
        let store = Arc::clone(&self.store);
        let config = self.config.clone();
        let task: Box<dyn Task> = if movable {
            Box::new(MoveTask::new(task_id, sources, target_dir, store, config))
        } else {
            Box::new(CopyTask::new(task_id, sources, target_dir, store, config, is_move))
        };
        Some(self.queue(task))
    }

    /// Archive `entries` into a zip file inside `dir`.
    pub fn zip_selection(&self, dir: Entry, entries: Vec<Entry>) -> Option<QueuedTask> {
        if entries.is_empty() {
            return None;
        }
        let task = ZipTask::new(
            self.generate_task_id(),
            entries,
            dir,
            Arc::clone(&self.store),
            Arc::clone(&self.archiver),
            self.config.clone(),
        );
        Some(self.queue(Box::new(task)))
    }

    fn queue(&self, mut task: Box<dyn Task>) -> QueuedTask {
        let handle = task.handle();
        let task_id = handle.task_id().clone();
        debug!(task_id = %task_id, operation = %task.core().operation_type(), "Queueing task");
        self.tasks.insert(task_id.clone(), handle.clone());

        let events = self.events.clone();
        let tasks = Arc::clone(&self.tasks);
        let join = tokio::spawn(async move {
            let reason = execute(task.as_mut(), &events).await;
            tasks.remove(&task_id);
            reason
        });

        QueuedTask { handle, join }
    }

    /// Request cancellation of a live task. Returns whether it was found.
    pub fn request_task_cancel(&self, task_id: &TaskId) -> bool {
        match self.tasks.get(task_id) {
            Some(handle) => {
                handle.request_cancel();
                true
            }
            None => false,
        }
    }

    /// Request cancellation of every live task.
    pub fn request_cancel_all(&self) {
        for handle in self.tasks.iter() {
            handle.request_cancel();
        }
    }

    pub fn has_queued_tasks(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Latest status of a live task.
    pub fn task_status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.tasks.get(task_id).map(|handle| handle.status())
    }

    /// Progress summed over every live task.
    pub fn status(&self) -> ManagerStatus {
        let mut summary = ManagerStatus::default();
        let mut mixed = false;

        for handle in self.tasks.iter() {
            let status = handle.status();
            summary.num_tasks += 1;
            summary.num_remaining_items += status.num_remaining_items;
            summary.total_bytes += status.total_bytes;
            summary.processed_bytes += status.processed_bytes;
            match summary.operation_type {
                None if !mixed => summary.operation_type = Some(status.operation_type),
                Some(kind) if kind != status.operation_type => {
                    summary.operation_type = None;
                    mixed = true;
                }
                _ => {}
            }
        }

        summary
    }
}

impl std::fmt::Debug for OperationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationManager")
            .field("config", &self.config)
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

fn is_direct_child(entry: &Entry, dir: &Entry) -> bool {
    entry
        .id
        .parent()
        .is_some_and(|parent| parent.trim_end_matches('/') == dir.id.as_str().trim_end_matches('/'))
}
