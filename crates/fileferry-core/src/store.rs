//! Collaborator traits consumed by the task engine.
//!
//! The engine never touches a disk itself. Hosts plug in a [`FileStore`] for
//! listing, inspecting and transferring entries, and an [`Archiver`] for zip
//! creation. Both traits are dyn-compatible so tasks can hold them behind an
//! `Arc`.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{ArchiveError, Entry, EntryId, StoreResult};

/// Type alias for boxed futures returned by collaborator methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Notification emitted by [`FileStore::copy`] while a transfer runs.
#[derive(Debug, Clone)]
pub enum CopyEvent {
    /// `bytes` of `source` have been written so far.
    Progress { source: EntryId, bytes: u64 },
    /// `source` (the copied entry itself or one of its descendants) has been
    /// fully copied. `destination` is `None` when the copy could not be
    /// looked up afterwards, e.g. because it was deleted right away.
    EntryCreated {
        source: EntryId,
        destination: Option<Entry>,
    },
}

/// A chunked directory listing.
pub trait DirectoryReader: Send {
    /// Read the next batch of children. An empty batch ends the listing.
    fn read_entries(&mut self) -> BoxFuture<'_, StoreResult<Vec<Entry>>>;
}

/// Access to the underlying file system.
///
/// Implementations must be safe for concurrent use: several tasks may call
/// into the same store at once.
pub trait FileStore: Send + Sync {
    /// Look up `path` relative to `dir`. Reports
    /// [`StoreError::NotFound`](crate::StoreError::NotFound) when nothing
    /// exists there.
    fn resolve<'a>(&'a self, dir: &'a Entry, path: &'a str) -> BoxFuture<'a, StoreResult<Entry>>;

    /// Start listing the children of `dir`.
    fn reader(&self, dir: &Entry) -> Box<dyn DirectoryReader>;

    /// Size of a file in bytes.
    fn size<'a>(&'a self, entry: &'a Entry) -> BoxFuture<'a, StoreResult<u64>>;

    /// Recursively copy `source` into `target_dir` under `name`.
    ///
    /// Progress is reported through `events`. Cancelling `cancel` asks the
    /// store to abort the transfer, which then fails with
    /// [`StoreError::Aborted`](crate::StoreError::Aborted).
    fn copy<'a>(
        &'a self,
        source: &'a Entry,
        target_dir: &'a Entry,
        name: &'a str,
        events: mpsc::Sender<CopyEvent>,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, StoreResult<Entry>>;

    /// Atomically move `source` into `target_dir` under `name`.
    fn rename<'a>(
        &'a self,
        source: &'a Entry,
        target_dir: &'a Entry,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Entry>>;

    /// Delete an entry, recursively for directories.
    fn remove<'a>(&'a self, entry: &'a Entry) -> BoxFuture<'a, StoreResult<()>>;

    /// Whether `source` can be renamed into `target_dir`, i.e. both live on
    /// the same transport. Moves fall back to copy+delete otherwise.
    fn is_movable(&self, _source: &Entry, _target_dir: &Entry) -> bool {
        true
    }
}

/// Zip archive creation.
pub trait Archiver: Send + Sync {
    /// Archive `entries` into `base_dir/dest_name`, naming members relative
    /// to `base_dir`. Returns the created archive.
    fn archive<'a>(
        &'a self,
        entries: &'a [Entry],
        base_dir: &'a Entry,
        dest_name: &'a str,
    ) -> BoxFuture<'a, Result<Entry, ArchiveError>>;
}
