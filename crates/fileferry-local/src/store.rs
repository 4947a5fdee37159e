//! File store over the local file system.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use fileferry_core::{
    BoxFuture, CopyEvent, DirectoryReader, Entry, EntryId, EntryKind, FileStore, StoreError,
    StoreResult,
};

/// Number of entries returned per directory read.
pub const READ_PAGE_SIZE: usize = 64;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn path_of(entry: &Entry) -> &Path {
    Path::new(entry.id.as_str())
}

fn entry_at(path: &Path, metadata: &Metadata) -> Entry {
    let (kind, size) = if metadata.is_dir() {
        (EntryKind::Directory, 0)
    } else {
        (EntryKind::File, metadata.len())
    };
    Entry::new(display(path), kind, size)
}

async fn lookup(path: &Path) -> StoreResult<Entry> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|e| StoreError::io(display(path), e))?;
    Ok(entry_at(path, &metadata))
}

/// A [`FileStore`] over the local disk.
///
/// Copies never overwrite: a destination that already exists fails the copy.
#[derive(Debug, Clone, Default)]
pub struct LocalFileStore;

impl LocalFileStore {
    pub fn new() -> Self {
        Self
    }

    /// Look up the entry at `path`.
    pub async fn entry(&self, path: impl AsRef<Path>) -> StoreResult<Entry> {
        lookup(path.as_ref()).await
    }
}

struct LocalReader {
    dir: PathBuf,
    read_dir: Option<fs::ReadDir>,
    done: bool,
}

impl DirectoryReader for LocalReader {
    fn read_entries(&mut self) -> BoxFuture<'_, StoreResult<Vec<Entry>>> {
        Box::pin(async move {
            if self.done {
                return Ok(Vec::new());
            }
            if self.read_dir.is_none() {
                let read_dir = fs::read_dir(&self.dir)
                    .await
                    .map_err(|e| StoreError::io(display(&self.dir), e))?;
                self.read_dir = Some(read_dir);
            }
            let Some(read_dir) = self.read_dir.as_mut() else {
                return Ok(Vec::new());
            };

            let mut batch = Vec::with_capacity(READ_PAGE_SIZE);
            while batch.len() < READ_PAGE_SIZE {
                let next = read_dir
                    .next_entry()
                    .await
                    .map_err(|e| StoreError::io(display(&self.dir), e))?;
                let Some(child) = next else {
                    self.done = true;
                    break;
                };
                let path = child.path();
                let metadata = child
                    .metadata()
                    .await
                    .map_err(|e| StoreError::io(display(&path), e))?;
                batch.push(entry_at(&path, &metadata));
            }
            Ok(batch)
        })
    }
}

/// Copy `source` to `target`, reporting progress per chunk.
async fn copy_file(
    source: &Path,
    target: &Path,
    events: &mpsc::Sender<CopyEvent>,
    cancel: &CancellationToken,
) -> StoreResult<()> {
    let id = EntryId::new(display(source));
    let mut reader = fs::File::open(source)
        .await
        .map_err(|e| StoreError::io(display(source), e))?;
    let mut writer = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .await
        .map_err(|e| StoreError::io(display(target), e))?;

    let mut buffer = vec![0; COPY_BUFFER_SIZE];
    let mut copied = 0u64;
    loop {
        if cancel.is_cancelled() {
            drop(writer);
            // Best effort: the partial file is useless.
            let _ = fs::remove_file(target).await;
            return Err(StoreError::Aborted);
        }

        let count = reader
            .read(&mut buffer)
            .await
            .map_err(|e| StoreError::io(display(source), e))?;
        if count == 0 {
            break;
        }
        writer
            .write_all(&buffer[..count])
            .await
            .map_err(|e| StoreError::io(display(target), e))?;

        copied += count as u64;
        let _ = events
            .send(CopyEvent::Progress {
                source: id.clone(),
                bytes: copied,
            })
            .await;
    }

    writer
        .flush()
        .await
        .map_err(|e| StoreError::io(display(target), e))?;
    Ok(())
}

/// Recursively copy `source` to `target`, announcing every created entry.
fn copy_tree<'a>(
    source: PathBuf,
    target: PathBuf,
    events: &'a mpsc::Sender<CopyEvent>,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, StoreResult<()>> {
    Box::pin(async move {
        if cancel.is_cancelled() {
            return Err(StoreError::Aborted);
        }

        let metadata = fs::symlink_metadata(&source)
            .await
            .map_err(|e| StoreError::io(display(&source), e))?;
        if metadata.is_dir() {
            fs::create_dir(&target)
                .await
                .map_err(|e| StoreError::io(display(&target), e))?;
            announce(&source, &target, events).await;

            let mut children = fs::read_dir(&source)
                .await
                .map_err(|e| StoreError::io(display(&source), e))?;
            while let Some(child) = children
                .next_entry()
                .await
                .map_err(|e| StoreError::io(display(&source), e))?
            {
                copy_tree(child.path(), target.join(child.file_name()), events, cancel).await?;
            }
        } else {
            copy_file(&source, &target, events, cancel).await?;
            announce(&source, &target, events).await;
        }
        Ok(())
    })
}

async fn announce(source: &Path, target: &Path, events: &mpsc::Sender<CopyEvent>) {
    let _ = events
        .send(CopyEvent::EntryCreated {
            source: EntryId::new(display(source)),
            destination: lookup(target).await.ok(),
        })
        .await;
}

impl FileStore for LocalFileStore {
    fn resolve<'a>(&'a self, dir: &'a Entry, path: &'a str) -> BoxFuture<'a, StoreResult<Entry>> {
        Box::pin(async move { lookup(&path_of(dir).join(path)).await })
    }

    fn reader(&self, dir: &Entry) -> Box<dyn DirectoryReader> {
        Box::new(LocalReader {
            dir: path_of(dir).to_path_buf(),
            read_dir: None,
            done: false,
        })
    }

    fn size<'a>(&'a self, entry: &'a Entry) -> BoxFuture<'a, StoreResult<u64>> {
        Box::pin(async move {
            let path = path_of(entry);
            let metadata = fs::metadata(path)
                .await
                .map_err(|e| StoreError::io(display(path), e))?;
            Ok(metadata.len())
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
            let target = path_of(target_dir).join(name);
            if target.starts_with(path_of(source)) {
                return Err(StoreError::other(format!(
                    "Cannot copy {} into itself",
                    source.id
                )));
            }
            debug!(source = %source.id, target = %target.display(), "Copying");
            copy_tree(path_of(source).to_path_buf(), target.clone(), &events, &cancel).await?;
            lookup(&target).await
        })
    }

    fn rename<'a>(
        &'a self,
        source: &'a Entry,
        target_dir: &'a Entry,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Entry>> {
        Box::pin(async move {
            let target = path_of(target_dir).join(name);
            fs::rename(path_of(source), &target)
                .await
                .map_err(|e| StoreError::io(source.id.as_str(), e))?;
            lookup(&target).await
        })
    }

    fn remove<'a>(&'a self, entry: &'a Entry) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let path = path_of(entry);
            let metadata = fs::symlink_metadata(path)
                .await
                .map_err(|e| StoreError::io(display(path), e))?;
            let result = if metadata.is_dir() {
                fs::remove_dir_all(path).await
            } else {
                fs::remove_file(path).await
            };
            result.map_err(|e| StoreError::io(display(path), e))
        })
    }

    #[cfg(unix)]
    fn is_movable(&self, source: &Entry, target_dir: &Entry) -> bool {
        use std::os::unix::fs::MetadataExt;

        match (
            std::fs::symlink_metadata(path_of(source)),
            std::fs::metadata(path_of(target_dir)),
        ) {
            (Ok(source), Ok(target)) => source.dev() == target.dev(),
            _ => false,
        }
    }
}
