//! Zip archive creation on the local disk.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use fileferry_core::{ArchiveError, Archiver, BoxFuture, Entry, EntryKind};

/// Members at or above this size need zip64 headers.
const LARGE_FILE_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Writes zip archives with member names relative to the base directory.
#[derive(Debug, Clone, Copy)]
pub struct ZipArchiver {
    compression: CompressionMethod,
}

impl Default for ZipArchiver {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::Deflated,
        }
    }
}

impl ZipArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different compression method for every member.
    pub fn with_compression(mut self, compression: CompressionMethod) -> Self {
        self.compression = compression;
        self
    }
}

struct Member {
    path: PathBuf,
    name: String,
    kind: EntryKind,
    size: u64,
}

/// Archive path of `path` relative to `base`, `/`-separated. Entries outside
/// `base` are stored under their file name.
fn member_name(path: &Path, base: &Path) -> String {
    let relative = match path.strip_prefix(base) {
        Ok(relative) if !relative.as_os_str().is_empty() => relative,
        _ => path.file_name().map(Path::new).unwrap_or(path),
    };
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn io_error(path: &Path, source: io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.to_string_lossy().into_owned(),
        source,
    }
}

fn write_archive(
    output: &Path,
    members: &[Member],
    compression: CompressionMethod,
) -> Result<u64, ArchiveError> {
    let file = File::create_new(output).map_err(|e| io_error(output, e))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(compression);

    for member in members {
        match member.kind {
            EntryKind::Directory => {
                let name = format!("{}/", member.name.trim_end_matches('/'));
                writer
                    .add_directory(name, options)
                    .map_err(|e| ArchiveError::failed(e.to_string()))?;
            }
            EntryKind::File => {
                let options = options.large_file(member.size >= LARGE_FILE_THRESHOLD);
                writer
                    .start_file(member.name.as_str(), options)
                    .map_err(|e| ArchiveError::failed(e.to_string()))?;
                let mut source = File::open(&member.path).map_err(|e| io_error(&member.path, e))?;
                io::copy(&mut source, &mut writer).map_err(|e| io_error(&member.path, e))?;
            }
        }
    }

    let file = writer
        .finish()
        .map_err(|e| ArchiveError::failed(e.to_string()))?;
    let metadata = file.metadata().map_err(|e| io_error(output, e))?;
    Ok(metadata.len())
}

impl Archiver for ZipArchiver {
    fn archive<'a>(
        &'a self,
        entries: &'a [Entry],
        base_dir: &'a Entry,
        dest_name: &'a str,
    ) -> BoxFuture<'a, Result<Entry, ArchiveError>> {
        Box::pin(async move {
            if entries.is_empty() {
                return Err(ArchiveError::Empty);
            }

            let base = PathBuf::from(base_dir.id.as_str());
            let output = base.join(dest_name);
            let members: Vec<Member> = entries
                .iter()
                .map(|entry| {
                    let path = PathBuf::from(entry.id.as_str());
                    Member {
                        name: member_name(&path, &base),
                        path,
                        kind: entry.kind,
                        size: entry.size,
                    }
                })
                .collect();
            debug!(archive = %output.display(), members = members.len(), "Writing zip archive");

            let compression = self.compression;
            let target = output.clone();
            let result =
                tokio::task::spawn_blocking(move || write_archive(&target, &members, compression))
                    .await
                    .map_err(|e| ArchiveError::failed(e.to_string()))?;

            match result {
                Ok(size) => Ok(Entry::file(output.to_string_lossy().into_owned(), size)),
                Err(error) => {
                    if !matches!(&error, ArchiveError::Io { path, .. } if Path::new(path) == output)
                    {
                        // Partial archives are never left behind.
                        if let Err(e) = std::fs::remove_file(&output) {
                            warn!(archive = %output.display(), error = %e, "Failed to remove partial archive");
                        }
                    }
                    Err(error)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_name_relative_to_base() {
        let base = Path::new("/home/user");
        assert_eq!(member_name(Path::new("/home/user/a.txt"), base), "a.txt");
        assert_eq!(member_name(Path::new("/home/user/dir/b.txt"), base), "dir/b.txt");
        assert_eq!(member_name(Path::new("/elsewhere/c.txt"), base), "c.txt");
    }
}
