//! Error types reported by the engine's collaborators.

use thiserror::Error;

/// Result type for [`FileStore`](crate::FileStore) calls.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors a file store can report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No entry exists at the path.
    #[error("Entry not found: {path}")]
    NotFound { path: String },

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: String },

    /// The entry exists but is not of the expected kind.
    #[error("Type mismatch: {path}")]
    TypeMismatch { path: String },

    /// A long-running call was aborted through its cancellation token.
    #[error("Operation aborted")]
    Aborted,

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Other error.
    #[error("{message}")]
    Other { message: String },
}

impl StoreError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an error from a message.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors an [`Archiver`](crate::Archiver) can report.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// There was nothing to archive.
    #[error("Nothing to archive")]
    Empty,

    /// I/O error while reading sources or writing the archive.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The archive codec failed.
    #[error("Archive creation failed: {message}")]
    Failed { message: String },
}

impl ArchiveError {
    /// Create a codec failure from a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}
