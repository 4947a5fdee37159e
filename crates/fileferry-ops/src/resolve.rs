//! Recursive tree resolution.

use std::collections::VecDeque;

use futures::future::join_all;

use fileferry_core::{Entry, FileStore, StoreResult};

use crate::ConcurrencyLimiter;

/// Size assigned to every directory during resolution.
///
/// Directories are not measured; giving them one byte lets progress advance
/// while a copy descends into them.
pub const DIRECTORY_SIZE: u64 = 1;

/// List every child of `dir`, reading until the store returns an empty batch.
pub async fn list_entries(store: &dyn FileStore, dir: &Entry) -> StoreResult<Vec<Entry>> {
    let mut reader = store.reader(dir);
    let mut children = Vec::new();
    loop {
        let batch = reader.read_entries().await?;
        if batch.is_empty() {
            return Ok(children);
        }
        children.extend(batch);
    }
}

/// Expand `entry` into itself plus all of its descendants, with sizes.
///
/// Directories are walked breadth-first. Each child is appended as soon as
/// its directory listing returns it, before its own children. Files get
/// their size from the store through `limiter`; directories get
/// [`DIRECTORY_SIZE`]. On error the partial result is discarded and the
/// first error is returned, after every lookup already started has finished.
pub async fn resolve_recursively(
    store: &dyn FileStore,
    limiter: &ConcurrencyLimiter,
    entry: &Entry,
) -> StoreResult<Vec<Entry>> {
    let mut resolved = vec![entry.clone()];
    let mut pending_dirs = VecDeque::new();
    if entry.is_directory() {
        pending_dirs.push_back(0);
    }

    while let Some(index) = pending_dirs.pop_front() {
        let mut reader = store.reader(&resolved[index]);
        loop {
            let batch = reader.read_entries().await?;
            if batch.is_empty() {
                break;
            }
            for child in batch {
                if child.is_directory() {
                    pending_dirs.push_back(resolved.len());
                }
                resolved.push(child);
            }
        }
    }

    let files: Vec<usize> = resolved
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.is_file())
        .map(|(index, _)| index)
        .collect();
    let sizes = join_all(
        files
            .iter()
            .map(|&index| limiter.run(store.size(&resolved[index]))),
    )
    .await;

    for (index, size) in files.into_iter().zip(sizes) {
        resolved[index].size = size?;
    }
    for entry in resolved.iter_mut().filter(|entry| entry.is_directory()) {
        entry.size = DIRECTORY_SIZE;
    }

    Ok(resolved)
}
