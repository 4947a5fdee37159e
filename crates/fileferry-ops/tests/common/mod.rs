//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use fileferry_core::{
    ArchiveError, Archiver, BoxFuture, CopyEvent, DirectoryReader, Entry, EntryKind, FileStore,
    StoreError, StoreResult,
};
use fileferry_ops::{
    EntryChangeKind, EventRouter, EventSink, OperationError, TaskId, TaskStatus, TerminalReason,
};

const PAGE_SIZE: usize = 2;

#[derive(Debug, Clone, Copy)]
struct Node {
    kind: EntryKind,
    size: u64,
}

#[derive(Default)]
struct StoreState {
    nodes: BTreeMap<String, Node>,
    failing_copies: HashSet<String>,
    fail_all_copies: bool,
    block_copies: bool,
    failing_renames: HashSet<String>,
    failing_removals: HashSet<String>,
    failing_sizes: HashSet<String>,
    failing_listings: HashSet<String>,
    not_movable: bool,
    copy_calls: Vec<String>,
    rename_calls: Vec<String>,
    remove_calls: Vec<String>,
}

fn parent_of(path: &str) -> Option<String> {
    fileferry_core::EntryId::new(path).parent().map(str::to_string)
}

fn not_found(path: &str) -> StoreError {
    StoreError::NotFound {
        path: path.to_string(),
    }
}

/// A file tree held in memory, with listings paged two entries at a time.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_dir(&self, path: &str) -> Entry {
        self.insert(path, EntryKind::Directory, 0);
        Entry::directory(path)
    }

    pub fn add_file(&self, path: &str, size: u64) -> Entry {
        self.insert(path, EntryKind::File, size);
        Entry::file(path, size)
    }

    fn insert(&self, path: &str, kind: EntryKind, size: u64) {
        self.state
            .lock()
            .unwrap()
            .nodes
            .insert(path.to_string(), Node { kind, size });
    }

    pub fn exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().nodes.contains_key(path)
    }

    pub fn fail_copy(&self, path: &str) {
        self.state.lock().unwrap().failing_copies.insert(path.to_string());
    }

    pub fn fail_all_copies(&self) {
        self.state.lock().unwrap().fail_all_copies = true;
    }

    /// Copies wait for their cancellation token and then abort.
    pub fn block_copies(&self) {
        self.state.lock().unwrap().block_copies = true;
    }

    pub fn fail_rename(&self, path: &str) {
        self.state.lock().unwrap().failing_renames.insert(path.to_string());
    }

    pub fn fail_remove(&self, path: &str) {
        self.state.lock().unwrap().failing_removals.insert(path.to_string());
    }

    pub fn fail_size(&self, path: &str) {
        self.state.lock().unwrap().failing_sizes.insert(path.to_string());
    }

    pub fn fail_listing(&self, path: &str) {
        self.state.lock().unwrap().failing_listings.insert(path.to_string());
    }

    pub fn set_movable(&self, movable: bool) {
        self.state.lock().unwrap().not_movable = !movable;
    }

    pub fn copy_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().copy_calls.clone()
    }

    pub fn rename_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().rename_calls.clone()
    }

    pub fn remove_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().remove_calls.clone()
    }

    fn entry(path: &str, node: Node) -> Entry {
        Entry::new(path, node.kind, node.size)
    }

    fn children(state: &StoreState, dir: &str) -> Vec<Entry> {
        state
            .nodes
            .iter()
            .filter(|(path, _)| parent_of(path).as_deref() == Some(dir))
            .map(|(path, node)| Self::entry(path, *node))
            .collect()
    }

    /// `root` followed by its descendants, parents before children.
    fn subtree(state: &StoreState, root: &str) -> Vec<(String, Node)> {
        let prefix = format!("{root}/");
        state
            .nodes
            .iter()
            .filter(|(path, _)| path.as_str() == root || path.starts_with(&prefix))
            .map(|(path, node)| (path.clone(), *node))
            .collect()
    }
}

struct MemoryReader {
    batches: VecDeque<Vec<Entry>>,
    error: Option<StoreError>,
}

impl DirectoryReader for MemoryReader {
    fn read_entries(&mut self) -> BoxFuture<'_, StoreResult<Vec<Entry>>> {
        Box::pin(async move {
            if let Some(error) = self.error.take() {
                return Err(error);
            }
            Ok(self.batches.pop_front().unwrap_or_default())
        })
    }
}

impl FileStore for MemoryStore {
    fn resolve<'a>(&'a self, dir: &'a Entry, path: &'a str) -> BoxFuture<'a, StoreResult<Entry>> {
        Box::pin(async move {
            let full = dir.id.join(path);
            let state = self.state.lock().unwrap();
            state
                .nodes
                .get(full.as_str())
                .map(|node| Self::entry(full.as_str(), *node))
                .ok_or_else(|| not_found(full.as_str()))
        })
    }

    fn reader(&self, dir: &Entry) -> Box<dyn DirectoryReader> {
        let state = self.state.lock().unwrap();
        let error = state
            .failing_listings
            .contains(dir.id.as_str())
            .then(|| StoreError::other(format!("cannot list {}", dir.id)));
        let batches = Self::children(&state, dir.id.as_str())
            .chunks(PAGE_SIZE)
            .map(<[Entry]>::to_vec)
            .collect();
        Box::new(MemoryReader { batches, error })
    }

    fn size<'a>(&'a self, entry: &'a Entry) -> BoxFuture<'a, StoreResult<u64>> {
        Box::pin(async move {
            let state = self.state.lock().unwrap();
            if state.failing_sizes.contains(entry.id.as_str()) {
                return Err(StoreError::other(format!("cannot stat {}", entry.id)));
            }
            state
                .nodes
                .get(entry.id.as_str())
                .map(|node| node.size)
                .ok_or_else(|| not_found(entry.id.as_str()))
        })
    }

    fn copy<'a>(
        &'a self,
        source: &'a Entry,
        target_dir: &'a Entry,
        name: &'a str,
        events: mpsc::Sender<CopyEvent>,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, StoreResult<Entry>> {
        Box::pin(async move {
            let (blocked, copied) = {
                let mut state = self.state.lock().unwrap();
                state.copy_calls.push(source.id.to_string());
                if state.fail_all_copies || state.failing_copies.contains(source.id.as_str()) {
                    return Err(StoreError::other(format!("cannot copy {}", source.id)));
                }
                if cancel.is_cancelled() {
                    return Err(StoreError::Aborted);
                }

                let destination = target_dir.id.join(name);
                let copied: Vec<(String, Entry)> = Self::subtree(&state, source.id.as_str())
                    .into_iter()
                    .map(|(path, node)| {
                        let suffix = &path[source.id.len()..];
                        let target = format!("{destination}{suffix}");
                        (path, Self::entry(&target, node))
                    })
                    .collect();
                if !state.block_copies {
                    for (_, entry) in &copied {
                        state.nodes.insert(
                            entry.id.to_string(),
                            Node {
                                kind: entry.kind,
                                size: entry.size,
                            },
                        );
                    }
                }
                (state.block_copies, copied)
            };

            if blocked {
                cancel.cancelled().await;
                return Err(StoreError::Aborted);
            }

            for (source_path, entry) in &copied {
                if entry.is_file() && entry.size > 0 {
                    let _ = events
                        .send(CopyEvent::Progress {
                            source: source_path.as_str().into(),
                            bytes: entry.size / 2,
                        })
                        .await;
                }
                let _ = events
                    .send(CopyEvent::EntryCreated {
                        source: source_path.as_str().into(),
                        destination: Some(entry.clone()),
                    })
                    .await;
            }

            copied
                .into_iter()
                .next()
                .map(|(_, entry)| entry)
                .ok_or_else(|| not_found(source.id.as_str()))
        })
    }

    fn rename<'a>(
        &'a self,
        source: &'a Entry,
        target_dir: &'a Entry,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Entry>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.rename_calls.push(source.id.to_string());
            if state.failing_renames.contains(source.id.as_str()) {
                return Err(StoreError::other(format!("cannot rename {}", source.id)));
            }

            let destination = target_dir.id.join(name);
            let moved = Self::subtree(&state, source.id.as_str());
            if moved.is_empty() {
                return Err(not_found(source.id.as_str()));
            }
            // The subtree starts with the source itself.
            let result = Self::entry(destination.as_str(), moved[0].1);
            for (path, node) in moved {
                state.nodes.remove(&path);
                let target = format!("{destination}{}", &path[source.id.len()..]);
                state.nodes.insert(target, node);
            }
            Ok(result)
        })
    }

    fn remove<'a>(&'a self, entry: &'a Entry) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.remove_calls.push(entry.id.to_string());
            if state.failing_removals.contains(entry.id.as_str()) {
                return Err(StoreError::PermissionDenied {
                    path: entry.id.to_string(),
                });
            }
            for (path, _) in Self::subtree(&state, entry.id.as_str()) {
                state.nodes.remove(&path);
            }
            Ok(())
        })
    }

    fn is_movable(&self, _source: &Entry, _target_dir: &Entry) -> bool {
        !self.state.lock().unwrap().not_movable
    }
}

/// One recorded archiver call.
#[derive(Debug, Clone)]
pub struct ArchiveCall {
    pub entries: Vec<String>,
    pub base_dir: String,
    pub dest_name: String,
}

/// Archiver that records its calls and drops a file of the combined size
/// into the store.
pub struct MemoryArchiver {
    store: Arc<MemoryStore>,
    fail: Mutex<bool>,
    calls: Mutex<Vec<ArchiveCall>>,
}

impl MemoryArchiver {
    pub fn new(store: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            fail: Mutex::new(false),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn fail(&self) {
        *self.fail.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<ArchiveCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Archiver for MemoryArchiver {
    fn archive<'a>(
        &'a self,
        entries: &'a [Entry],
        base_dir: &'a Entry,
        dest_name: &'a str,
    ) -> BoxFuture<'a, Result<Entry, ArchiveError>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(ArchiveCall {
                entries: entries.iter().map(|entry| entry.id.to_string()).collect(),
                base_dir: base_dir.id.to_string(),
                dest_name: dest_name.to_string(),
            });
            if *self.fail.lock().unwrap() {
                return Err(ArchiveError::failed("codec exploded"));
            }
            let size = entries.iter().filter(|e| e.is_file()).map(|e| e.size).sum();
            Ok(self.store.add_file(base_dir.id.join(dest_name).as_str(), size))
        })
    }
}

/// A notification received by [`RecordingSink`].
#[derive(Debug, Clone)]
pub enum SinkEvent {
    Begin(TaskId, TaskStatus),
    Progress(TaskId, TaskStatus),
    EntryChanged(EntryChangeKind, Vec<String>),
    Terminal(TaskId, TerminalReason, TaskStatus, Option<String>),
}

/// Event sink recording every notification in order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<TaskStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Progress(_, status) => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn changed(&self, kind: EntryChangeKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::EntryChanged(k, ids) if k == kind => Some(ids),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn terminals(&self) -> Vec<(TerminalReason, TaskStatus, Option<String>)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Terminal(_, reason, status, error) => Some((reason, status, error)),
                _ => None,
            })
            .collect()
    }

    /// The single terminal notification; panics unless exactly one arrived.
    pub fn terminal(&self) -> (TerminalReason, TaskStatus, Option<String>) {
        let mut terminals = self.terminals();
        assert_eq!(terminals.len(), 1, "expected exactly one terminal event");
        terminals.remove(0)
    }
}

impl EventSink for RecordingSink {
    fn on_begin(&self, task_id: &TaskId, status: &TaskStatus) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Begin(task_id.clone(), status.clone()));
    }

    fn on_progress(&self, task_id: &TaskId, status: &TaskStatus) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Progress(task_id.clone(), status.clone()));
    }

    fn on_entry_changed(&self, kind: EntryChangeKind, entries: &[Entry]) {
        let ids = entries.iter().map(|entry| entry.id.to_string()).collect();
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::EntryChanged(kind, ids));
    }

    fn on_terminal(
        &self,
        task_id: &TaskId,
        reason: TerminalReason,
        status: &TaskStatus,
        error: Option<&OperationError>,
    ) {
        self.events.lock().unwrap().push(SinkEvent::Terminal(
            task_id.clone(),
            reason,
            status.clone(),
            error.map(ToString::to_string),
        ));
    }
}

pub fn router(sink: &Arc<RecordingSink>) -> EventRouter {
    EventRouter::new(sink.clone(), Duration::from_millis(500))
}
