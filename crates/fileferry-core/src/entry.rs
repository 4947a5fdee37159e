//! File-system entry handles.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Identifier of an entry inside a [`FileStore`](crate::FileStore).
///
/// Identifiers are `/`-separated paths or URLs. They are opaque to the
/// engine except for their length (move ordering) and their last segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Create a new entry identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length of the identifier in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the identifier is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Identifier of the containing directory, if any.
    pub fn parent(&self) -> Option<&str> {
        let trimmed = self.0.trim_end_matches('/');
        match trimmed.rfind('/') {
            Some(0) => Some("/"),
            Some(i) => Some(&trimmed[..i]),
            None => None,
        }
    }

    /// Join a relative path onto this identifier.
    pub fn join(&self, path: &str) -> Self {
        if self.0.ends_with('/') {
            Self(format!("{}{}", self.0, path))
        } else {
            Self(format!("{}/{}", self.0, path))
        }
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntryId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Whether an entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    File,
    Directory,
}

/// A file or directory handle owned by a [`FileStore`](crate::FileStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Unique identifier (path or URL).
    pub id: EntryId,
    /// Last segment of the identifier.
    pub name: CompactString,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes. Annotated by tree resolution; directories report a
    /// nominal size there.
    pub size: u64,
}

impl Entry {
    /// Create an entry, deriving its name from the identifier.
    pub fn new(id: impl Into<EntryId>, kind: EntryKind, size: u64) -> Self {
        let id = id.into();
        let name = id
            .as_str()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        Self {
            name: CompactString::new(name),
            id,
            kind,
            size,
        }
    }

    /// Create a file entry.
    pub fn file(id: impl Into<EntryId>, size: u64) -> Self {
        Self::new(id, EntryKind::File, size)
    }

    /// Create a directory entry.
    pub fn directory(id: impl Into<EntryId>) -> Self {
        Self::new(id, EntryKind::Directory, 0)
    }

    /// Check if this is a directory.
    pub fn is_directory(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Check if this is a file.
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Name without its final extension. A leading dot does not start an
    /// extension.
    pub fn stem(&self) -> &str {
        match self.name.rfind('.') {
            Some(i) if i > 0 => &self.name[..i],
            _ => &self.name,
        }
    }
}
