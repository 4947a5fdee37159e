//! Copy task, optionally deleting the originals afterwards.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use fileferry_core::{BoxFuture, CopyEvent, Entry, FileStore, TaskConfig};

use crate::dedup::deduplicate_path;
use crate::events::{EntryChangeKind, EventRouter};
use crate::progress::OperationType;
use crate::rate_limit::RateLimiter;
use crate::task::{Task, TaskCore};
use crate::{OPERATION_CHANNEL_SIZE, OperationError, OperationResult, TaskId};

/// Copies every source entry into the target directory, one at a time.
///
/// A failing entry does not stop the batch: the task moves on to the next
/// source until `consecutive_error_limit` failures happen back to back, and
/// ends with the last error once every source was attempted. With
/// `delete_after_copy` the sources are removed once all copies succeeded,
/// which is how moves across file systems are carried out; each removal
/// counts as one remaining item.
#[derive(Debug)]
pub struct CopyTask {
    core: TaskCore,
    delete_after_copy: bool,
}

impl CopyTask {
    pub fn new(
        task_id: TaskId,
        source_entries: Vec<Entry>,
        target_dir: Entry,
        store: Arc<dyn FileStore>,
        config: TaskConfig,
        delete_after_copy: bool,
    ) -> Self {
        let operation_type = if delete_after_copy {
            OperationType::Move
        } else {
            OperationType::Copy
        };
        Self {
            core: TaskCore::new(
                task_id,
                operation_type,
                source_entries,
                target_dir,
                store,
                config,
            ),
            delete_after_copy,
        }
    }

    pub fn delete_after_copy(&self) -> bool {
        self.delete_after_copy
    }

    async fn run_copy(&mut self, events: &EventRouter) -> OperationResult<()> {
        let num_sources = self.core.source_entries().len();
        if num_sources == 0 {
            return Ok(());
        }

        let progress = self.core.progress_limiter(events);
        let error_limit = self.core.config().consecutive_error_limit;
        let mut error_count = 0;
        let mut last_error = None;

        for index in 0..num_sources {
            if self.core.is_cancel_requested() {
                progress.run_immediately();
                return Err(OperationError::Aborted);
            }

            self.core.send_progress(events);
            let result = self.process_entry(index, events, &progress).await;
            // Flush throttled progress before the next source starts.
            progress.run_immediately();

            match result {
                Ok(()) => {
                    self.core.complete_source(index);
                    error_count = 0;
                }
                Err(error) => {
                    self.core.advance(index);
                    error_count += 1;
                    warn!(
                        task_id = %self.core.task_id(),
                        index,
                        entry = %self.core.source_entries()[index].id,
                        consecutive = error_count,
                        %error,
                        "Failed to copy entry"
                    );
                    if error_count >= error_limit {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        if let Some(error) = last_error {
            return Err(error);
        }
        if self.delete_after_copy {
            if self.core.is_cancel_requested() {
                return Err(OperationError::Aborted);
            }
            self.delete_originals(events).await?;
        }
        Ok(())
    }

    async fn process_entry(
        &mut self,
        index: usize,
        events: &EventRouter,
        progress: &RateLimiter,
    ) -> OperationResult<()> {
        let source = self.core.source_entries()[index].clone();
        let target_dir = self.core.target_dir().clone();
        let store = Arc::clone(self.core.store());

        let name = deduplicate_path(
            store.as_ref(),
            &target_dir,
            &source.name,
            self.core.config().max_copy_number,
        )
        .await?;
        if self.core.is_cancel_requested() {
            return Err(OperationError::Aborted);
        }

        let _slot = self.core.acquire_transfer_slot().await?;
        debug!(task_id = %self.core.task_id(), entry = %source.id, %name, "Copying entry");

        let (tx, mut rx) = mpsc::channel(OPERATION_CHANNEL_SIZE);
        let cancel = self.core.cancel_token().child_token();
        let mut copy = store.copy(&source, &target_dir, &name, tx, cancel);

        let result = loop {
            tokio::select! {
                biased;
                Some(event) = rx.recv() => self.on_copy_event(index, event, events, progress),
                result = &mut copy => break result,
            }
        };
        while let Ok(event) = rx.try_recv() {
            self.on_copy_event(index, event, events, progress);
        }

        result?;
        Ok(())
    }

    fn on_copy_event(
        &mut self,
        index: usize,
        event: CopyEvent,
        events: &EventRouter,
        progress: &RateLimiter,
    ) {
        match event {
            CopyEvent::Progress { source, bytes } => {
                if self.core.update_progress(index, &source, Some(bytes)) {
                    progress.schedule();
                }
            }
            CopyEvent::EntryCreated {
                source,
                destination,
            } => {
                if self.core.update_progress(index, &source, None) {
                    progress.schedule();
                }
                // None when the copy vanished right after being written.
                if let Some(destination) = destination {
                    events.send_entry_changed(EntryChangeKind::Created, destination);
                }
            }
        }
    }

    /// Remove every source. All removals are attempted; the first failure is
    /// returned and leaves its item remaining.
    async fn delete_originals(&mut self, events: &EventRouter) -> OperationResult<()> {
        let store = Arc::clone(self.core.store());
        let mut first_error = None;

        for index in 0..self.core.source_entries().len() {
            let source = self.core.source_entries()[index].clone();
            match store.remove(&source).await {
                Ok(()) => {
                    self.core.release_item();
                    events.send_entry_changed(EntryChangeKind::Deleted, source);
                }
                Err(error) => {
                    warn!(
                        task_id = %self.core.task_id(),
                        entry = %source.id,
                        %error,
                        "Failed to delete original after copy"
                    );
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }
}

impl Task for CopyTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn initialize(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.core.resolve_each_source().await;
            if self.delete_after_copy {
                // Each original's removal is one more item.
                let removals = self.core.source_entries().len();
                self.core.reserve_items(removals);
            }
        })
    }

    fn run<'a>(&'a mut self, events: &'a EventRouter) -> BoxFuture<'a, OperationResult<()>> {
        Box::pin(self.run_copy(events))
    }
}
