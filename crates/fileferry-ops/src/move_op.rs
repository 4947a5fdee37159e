//! Move task built on atomic renames.

use std::sync::Arc;

use tracing::warn;

use fileferry_core::{BoxFuture, Entry, FileStore, TaskConfig};

use crate::dedup::deduplicate_path;
use crate::events::{EntryChangeKind, EventRouter};
use crate::progress::OperationType;
use crate::resolve::DIRECTORY_SIZE;
use crate::task::{Task, TaskCore, entry_map};
use crate::{OperationError, OperationResult, TaskId};

/// Renames every source entry into the target directory.
///
/// Only valid when sources and target share a transport. Sources are
/// processed longest path first, so a child is moved before any ancestor
/// that is part of the same batch. The first failing rename ends the task.
#[derive(Debug)]
pub struct MoveTask {
    core: TaskCore,
}

impl MoveTask {
    pub fn new(
        task_id: TaskId,
        mut source_entries: Vec<Entry>,
        target_dir: Entry,
        store: Arc<dyn FileStore>,
        config: TaskConfig,
    ) -> Self {
        source_entries.sort_by(|a, b| b.id.len().cmp(&a.id.len()));
        Self {
            core: TaskCore::new(
                task_id,
                OperationType::Move,
                source_entries,
                target_dir,
                store,
                config,
            ),
        }
    }

    /// A rename has no byte-level progress: each source counts as one byte.
    fn initialize_entries(&mut self) {
        let maps = self
            .core
            .source_entries()
            .iter()
            .map(|source| {
                let mut entry = source.clone();
                entry.size = DIRECTORY_SIZE;
                entry_map([entry])
            })
            .collect();
        self.core.set_processing_entries(maps);
    }

    async fn run_move(&mut self, events: &EventRouter) -> OperationResult<()> {
        let store = Arc::clone(self.core.store());
        let target_dir = self.core.target_dir().clone();
        let max_copy_number = self.core.config().max_copy_number;

        for index in 0..self.core.source_entries().len() {
            if self.core.is_cancel_requested() {
                return Err(OperationError::Aborted);
            }
            self.core.send_progress(events);

            let source = self.core.source_entries()[index].clone();
            let name =
                deduplicate_path(store.as_ref(), &target_dir, &source.name, max_copy_number)
                    .await?;
            let moved = store
                .rename(&source, &target_dir, &name)
                .await
                .inspect_err(|error| {
                    warn!(
                        task_id = %self.core.task_id(),
                        entry = %source.id,
                        %error,
                        "Failed to move entry"
                    );
                })?;

            events.send_entry_changed(EntryChangeKind::Created, moved);
            events.send_entry_changed(EntryChangeKind::Deleted, source);
            self.core.complete_source(index);
        }

        self.core.send_progress(events);
        Ok(())
    }
}

impl Task for MoveTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn initialize(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.initialize_entries() })
    }

    fn run<'a>(&'a mut self, events: &'a EventRouter) -> BoxFuture<'a, OperationResult<()>> {
        Box::pin(self.run_move(events))
    }
}
