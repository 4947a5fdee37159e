//! Zip archive task.

use std::sync::Arc;

use tracing::debug;

use fileferry_core::{Archiver, BoxFuture, Entry, FileStore, StoreError, TaskConfig};

use crate::dedup::deduplicate_path;
use crate::events::{EntryChangeKind, EventRouter};
use crate::progress::OperationType;
use crate::task::{Task, TaskCore};
use crate::{OperationError, OperationResult, TaskId};

const DEFAULT_ARCHIVE_STEM: &str = "Archive";

/// Archives the whole selection into one zip file in the target directory.
///
/// The target directory is also the archive's base: member names are
/// relative to it. The archiver reports no incremental progress, so the
/// processed bytes jump from 0 to the total once it returns. A selection
/// that cannot be fully resolved fails the task before anything is archived.
pub struct ZipTask {
    core: TaskCore,
    archiver: Arc<dyn Archiver>,
    resolve_error: Option<StoreError>,
}

impl ZipTask {
    pub fn new(
        task_id: TaskId,
        source_entries: Vec<Entry>,
        target_dir: Entry,
        store: Arc<dyn FileStore>,
        archiver: Arc<dyn Archiver>,
        config: TaskConfig,
    ) -> Self {
        Self {
            core: TaskCore::new(
                task_id,
                OperationType::Zip,
                source_entries,
                target_dir,
                store,
                config,
            ),
            archiver,
            resolve_error: None,
        }
    }

    /// Archive name before deduplication: the stem of a single source, or a
    /// generic name for a multi-entry selection.
    fn archive_name(&self) -> String {
        match self.core.source_entries() {
            [single] => format!("{}.zip", single.stem()),
            _ => format!("{DEFAULT_ARCHIVE_STEM}.zip"),
        }
    }

    async fn run_zip(&mut self, events: &EventRouter) -> OperationResult<()> {
        if self.core.source_entries().is_empty() {
            return Ok(());
        }
        if let Some(error) = self.resolve_error.take() {
            return Err(error.into());
        }

        let store = Arc::clone(self.core.store());
        let target_dir = self.core.target_dir().clone();
        let dest_name = deduplicate_path(
            store.as_ref(),
            &target_dir,
            &self.archive_name(),
            self.core.config().max_copy_number,
        )
        .await?;
        if self.core.is_cancel_requested() {
            return Err(OperationError::Aborted);
        }

        self.core.send_progress(events);
        let entries = self.core.resolved_entries();
        let _slot = self.core.acquire_transfer_slot().await?;
        debug!(
            task_id = %self.core.task_id(),
            entries = entries.len(),
            %dest_name,
            "Creating archive"
        );

        let archive = self
            .archiver
            .archive(&entries, &target_dir, &dest_name)
            .await?;

        self.core.complete_all();
        self.core.send_progress(events);
        events.send_entry_changed(EntryChangeKind::Created, archive);
        Ok(())
    }
}

impl std::fmt::Debug for ZipTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipTask")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl Task for ZipTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn initialize(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(error) = self.core.resolve_combined().await {
                self.resolve_error = Some(error);
            }
        })
    }

    fn run<'a>(&'a mut self, events: &'a EventRouter) -> BoxFuture<'a, OperationResult<()>> {
        Box::pin(self.run_zip(events))
    }
}
