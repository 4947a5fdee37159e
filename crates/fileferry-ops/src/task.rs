//! Shared task lifecycle and progress bookkeeping.

use std::sync::Arc;

use futures::future::join_all;
use indexmap::IndexMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fileferry_core::{BoxFuture, Entry, EntryId, FileStore, StoreResult, TaskConfig};

use crate::{
    ConcurrencyLimiter, DIRECTORY_SIZE, EventRouter, OperationError, OperationResult,
    OperationType, RateLimiter, Speedometer, TaskId, TaskStatus, TerminalReason,
    resolve_recursively,
};

/// Progress of one resolved entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingEntry {
    /// The resolved entry, with its size annotated.
    pub entry: Entry,
    /// Bytes processed so far, never above the entry's size.
    pub processed_bytes: u64,
    /// Whether the entry has been counted as done.
    pub completed: bool,
}

impl ProcessingEntry {
    fn new(entry: Entry) -> Self {
        Self {
            entry,
            processed_bytes: 0,
            completed: false,
        }
    }
}

type EntryMap = IndexMap<EntryId, ProcessingEntry>;

pub(crate) fn entry_map(entries: impl IntoIterator<Item = Entry>) -> EntryMap {
    entries
        .into_iter()
        .map(|entry| (entry.id.clone(), ProcessingEntry::new(entry)))
        .collect()
}

/// A source that failed to resolve is still processed as a single item.
fn unresolved(source: &Entry) -> Entry {
    let mut entry = source.clone();
    if entry.is_directory() {
        entry.size = DIRECTORY_SIZE;
    }
    entry
}

/// State shared by every task kind.
///
/// Owns the source list, the per-source maps of resolved entries and the
/// progress counters. Every counter mutation publishes a fresh
/// [`TaskStatus`] on a watch channel so [`TaskHandle`]s observe it.
pub struct TaskCore {
    task_id: TaskId,
    operation_type: OperationType,
    source_entries: Vec<Entry>,
    target_dir: Entry,
    store: Arc<dyn FileStore>,
    config: TaskConfig,
    processing_entries: Vec<EntryMap>,
    total_bytes: u64,
    processed_bytes: u64,
    num_remaining_items: usize,
    processing_source_index: usize,
    cancel: CancellationToken,
    transfer_slot: Arc<Semaphore>,
    speedometer: Speedometer,
    status_tx: watch::Sender<TaskStatus>,
    finished: bool,
}

impl TaskCore {
    /// Create the state for a task over `source_entries` into `target_dir`.
    pub fn new(
        task_id: TaskId,
        operation_type: OperationType,
        source_entries: Vec<Entry>,
        target_dir: Entry,
        store: Arc<dyn FileStore>,
        config: TaskConfig,
    ) -> Self {
        let speedometer = Speedometer::new(config.speed_window);
        let num_remaining_items = source_entries.len();
        let status = TaskStatus {
            operation_type,
            num_remaining_items,
            total_bytes: 0,
            processed_bytes: 0,
            processing_entry_name: source_entries
                .first()
                .map(|entry| entry.name.to_string())
                .unwrap_or_default(),
            target_dir_name: target_dir.name.to_string(),
            current_speed: 0,
            average_speed: 0,
            remaining_time: 0,
        };
        let (status_tx, _) = watch::channel(status);

        Self {
            task_id,
            operation_type,
            source_entries,
            target_dir,
            store,
            config,
            processing_entries: Vec::new(),
            total_bytes: 0,
            processed_bytes: 0,
            num_remaining_items,
            processing_source_index: 0,
            cancel: CancellationToken::new(),
            transfer_slot: Arc::new(Semaphore::new(1)),
            speedometer,
            status_tx,
            finished: false,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    pub fn source_entries(&self) -> &[Entry] {
        &self.source_entries
    }

    pub fn target_dir(&self) -> &Entry {
        &self.target_dir
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn processed_bytes(&self) -> u64 {
        self.processed_bytes
    }

    pub fn num_remaining_items(&self) -> usize {
        self.num_remaining_items
    }

    pub fn processing_source_index(&self) -> usize {
        self.processing_source_index
    }

    /// Resolved entries of the source at `index`, in discovery order.
    pub fn processing_entries(&self, index: usize) -> impl Iterator<Item = &ProcessingEntry> {
        self.processing_entries
            .get(index)
            .into_iter()
            .flat_map(|map| map.values())
    }

    /// Every resolved entry of every source, without duplicates.
    pub fn resolved_entries(&self) -> Vec<Entry> {
        let mut seen: IndexMap<&EntryId, &Entry> = IndexMap::new();
        for processing in self.processing_entries.iter().flat_map(|map| map.values()) {
            seen.entry(&processing.entry.id).or_insert(&processing.entry);
        }
        seen.into_values().cloned().collect()
    }

    /// Resolve every source tree concurrently, one map per source.
    ///
    /// A source whose tree cannot be resolved is logged and kept as a single
    /// item, so its own copy attempt reports the underlying failure.
    pub async fn resolve_each_source(&mut self) {
        let resolutions = self.resolve_sources().await;
        let maps = resolutions
            .into_iter()
            .zip(&self.source_entries)
            .map(|(result, source)| entry_map(result.unwrap_or_else(|_| vec![unresolved(source)])))
            .collect();
        self.set_processing_entries(maps);
    }

    /// Resolve every source tree into one combined map.
    ///
    /// Fails with the first resolution error. The totals then cover each
    /// failed source as a single item.
    pub async fn resolve_combined(&mut self) -> StoreResult<()> {
        let mut first_error = None;
        let mut combined = Vec::new();
        let resolutions = self.resolve_sources().await;
        for (result, source) in resolutions.into_iter().zip(&self.source_entries) {
            match result {
                Ok(entries) => combined.extend(entries),
                Err(error) => {
                    combined.push(unresolved(source));
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }
        self.set_processing_entries(vec![entry_map(combined)]);
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn resolve_sources(&self) -> Vec<StoreResult<Vec<Entry>>> {
        let limiter = ConcurrencyLimiter::new(self.config.concurrency_limit);
        let store = self.store.as_ref();
        let resolutions = join_all(
            self.source_entries
                .iter()
                .map(|source| resolve_recursively(store, &limiter, source)),
        )
        .await;

        for (result, source) in resolutions.iter().zip(&self.source_entries) {
            if let Err(error) = result {
                warn!(
                    task_id = %self.task_id,
                    entry = %source.id,
                    %error,
                    "Failed to resolve source entry"
                );
            }
        }
        resolutions
    }

    /// Install the resolved maps and derive the totals from them.
    pub fn set_processing_entries(&mut self, maps: Vec<IndexMap<EntryId, ProcessingEntry>>) {
        self.total_bytes = maps
            .iter()
            .flat_map(|map| map.values())
            .map(|processing| processing.entry.size)
            .sum();
        self.num_remaining_items = maps.iter().map(IndexMap::len).sum();
        self.processed_bytes = 0;
        self.processing_entries = maps;
        self.speedometer.set_total_bytes(self.total_bytes);
        debug!(
            task_id = %self.task_id,
            total_bytes = self.total_bytes,
            items = self.num_remaining_items,
            "Resolved task sources"
        );
        self.publish();
    }

    /// Record `bytes` processed for entry `id` of source `index`; `None`
    /// means the entry is done.
    ///
    /// Processed bytes never decrease and never exceed the entry's size. The
    /// remaining item count drops once, the first time the entry completes.
    /// Returns whether anything changed.
    pub fn update_progress(&mut self, index: usize, id: &EntryId, bytes: Option<u64>) -> bool {
        if self.finished {
            return false;
        }
        let Some(processing) = self
            .processing_entries
            .get_mut(index)
            .and_then(|map| map.get_mut(id))
        else {
            return false;
        };
        if processing.completed {
            return false;
        }

        let size = processing.entry.size;
        let processed = bytes
            .unwrap_or(size)
            .min(size)
            .max(processing.processed_bytes);
        let delta = processed - processing.processed_bytes;
        processing.processed_bytes = processed;
        let completed = processed == size;
        processing.completed = completed;

        if delta == 0 && !completed {
            return false;
        }
        if completed {
            self.num_remaining_items = self.num_remaining_items.saturating_sub(1);
        }
        self.add_processed(delta);
        true
    }

    /// Count every entry of source `index` as done and move past it.
    pub fn complete_source(&mut self, index: usize) {
        if self.finished {
            return;
        }
        let mut delta = 0;
        let mut completed = 0;
        if let Some(map) = self.processing_entries.get_mut(index) {
            for processing in map.values_mut().filter(|p| !p.completed) {
                delta += processing.entry.size - processing.processed_bytes;
                processing.processed_bytes = processing.entry.size;
                processing.completed = true;
                completed += 1;
            }
        }
        self.num_remaining_items = self.num_remaining_items.saturating_sub(completed);
        self.processing_source_index = self.processing_source_index.max(index + 1);
        self.add_processed(delta);
    }

    /// Move past source `index` without touching its counters.
    pub fn advance(&mut self, index: usize) {
        if self.finished {
            return;
        }
        self.processing_source_index = self.processing_source_index.max(index + 1);
        self.publish();
    }

    /// Add `count` items with no byte weight, such as follow-up removals.
    ///
    /// Meant for `initialize`: the remaining count never grows while running.
    pub fn reserve_items(&mut self, count: usize) {
        self.num_remaining_items += count;
        self.publish();
    }

    /// Count one reserved item as done.
    pub fn release_item(&mut self) {
        if self.finished {
            return;
        }
        self.num_remaining_items = self.num_remaining_items.saturating_sub(1);
        self.publish();
    }

    /// Count every resolved entry as done.
    pub fn complete_all(&mut self) {
        for index in 0..self.processing_entries.len() {
            self.complete_source(index);
        }
        if !self.finished {
            self.processing_source_index = self.source_entries.len();
            self.publish();
        }
    }

    fn add_processed(&mut self, delta: u64) {
        self.processed_bytes = (self.processed_bytes + delta).min(self.total_bytes);
        self.speedometer.update(self.processed_bytes);
        self.publish();
    }

    /// Snapshot of the task's progress.
    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            operation_type: self.operation_type,
            num_remaining_items: self.num_remaining_items,
            total_bytes: self.total_bytes,
            processed_bytes: self.processed_bytes,
            processing_entry_name: self
                .source_entries
                .get(self.processing_source_index)
                .map(|entry| entry.name.to_string())
                .unwrap_or_default(),
            target_dir_name: self.target_dir.name.to_string(),
            current_speed: self.speedometer.current_speed(),
            average_speed: self.speedometer.average_speed(),
            remaining_time: self.speedometer.remaining_time(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    /// Watch the published status snapshots.
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status_tx.subscribe()
    }

    /// Send the current status to the host right away.
    pub fn send_progress(&self, events: &EventRouter) {
        events.send_progress(&self.task_id, &self.status());
    }

    /// A limiter sending the latest published status at most once per
    /// progress interval.
    pub fn progress_limiter(&self, events: &EventRouter) -> RateLimiter {
        let events = events.clone();
        let task_id = self.task_id.clone();
        let status = self.status_tx.subscribe();
        RateLimiter::new(self.config.progress_interval(), move || {
            let snapshot = status.borrow().clone();
            events.send_progress(&task_id, &snapshot);
        })
    }

    /// Request cancellation. Idempotent; also aborts an in-flight transfer.
    pub fn request_cancel(&self) {
        if !self.cancel.is_cancelled() {
            debug!(task_id = %self.task_id, "Cancellation requested");
        }
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token cancelled together with the task.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Wait for the task's single transfer slot.
    pub async fn acquire_transfer_slot(&self) -> OperationResult<OwnedSemaphorePermit> {
        Arc::clone(&self.transfer_slot)
            .acquire_owned()
            .await
            .map_err(|_| OperationError::Aborted)
    }

    /// Freeze the counters once the task reached its terminal state.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// A cloneable handle for observing and cancelling the task.
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            task_id: self.task_id.clone(),
            cancel: self.cancel.clone(),
            status: self.status_tx.subscribe(),
        }
    }
}

impl std::fmt::Debug for TaskCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskCore")
            .field("task_id", &self.task_id)
            .field("operation_type", &self.operation_type)
            .field("total_bytes", &self.total_bytes)
            .field("processed_bytes", &self.processed_bytes)
            .field("num_remaining_items", &self.num_remaining_items)
            .field("processing_source_index", &self.processing_source_index)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

/// Observes and cancels a task from outside while it runs.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    task_id: TaskId,
    cancel: CancellationToken,
    status: watch::Receiver<TaskStatus>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Request cancellation of the task.
    pub fn request_cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Latest published status.
    pub fn status(&self) -> TaskStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<TaskStatus> {
        self.status.clone()
    }
}

/// A batch file operation.
///
/// Implemented by [`CopyTask`](crate::CopyTask), [`MoveTask`](crate::MoveTask)
/// and [`ZipTask`](crate::ZipTask). Tasks are single-use: [`execute`] runs
/// `initialize` then `run` exactly once.
pub trait Task: Send {
    fn core(&self) -> &TaskCore;

    fn core_mut(&mut self) -> &mut TaskCore;

    /// Resolve the sources and compute the totals.
    fn initialize(&mut self) -> BoxFuture<'_, ()>;

    /// Process every source, reporting to `events`.
    fn run<'a>(&'a mut self, events: &'a EventRouter) -> BoxFuture<'a, OperationResult<()>>;

    fn task_id(&self) -> &TaskId {
        self.core().task_id()
    }

    fn status(&self) -> TaskStatus {
        self.core().status()
    }

    fn request_cancel(&self) {
        self.core().request_cancel();
    }

    fn handle(&self) -> TaskHandle {
        self.core().handle()
    }
}

/// Drive `task` to its terminal state.
///
/// Sends a begin notification once the task is initialized and exactly one
/// terminal notification at the end.
pub async fn execute(task: &mut dyn Task, events: &EventRouter) -> TerminalReason {
    let task_id = task.task_id().clone();
    info!(
        task_id = %task_id,
        operation = %task.core().operation_type(),
        sources = task.core().source_entries().len(),
        "Starting task"
    );

    task.initialize().await;
    events.send_begin(&task_id, &task.status());

    let result = task.run(events).await;

    let core = task.core_mut();
    core.finish();
    let status = core.status();

    match result {
        Ok(()) => {
            info!(
                task_id = %task_id,
                processed_bytes = status.processed_bytes,
                "Task completed"
            );
            events.send_terminal(&task_id, TerminalReason::Success, &status, None);
            TerminalReason::Success
        }
        Err(error) if error.is_abort() => {
            info!(task_id = %task_id, "Task cancelled");
            events.send_terminal(&task_id, TerminalReason::Cancelled, &status, Some(&error));
            TerminalReason::Cancelled
        }
        Err(error) => {
            warn!(task_id = %task_id, %error, "Task failed");
            events.send_terminal(&task_id, TerminalReason::Error, &status, Some(&error));
            TerminalReason::Error
        }
    }
}
