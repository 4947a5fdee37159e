//! Task identifiers and the task error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fileferry_core::{ArchiveError, StoreError};

/// Opaque identifier of a task, stable for the task's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a task identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result type for task operations.
pub type OperationResult<T> = Result<T, OperationError>;

/// Errors that end a task or one of its entries.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The file store failed.
    #[error("File system error: {source}")]
    Filesystem {
        #[from]
        source: StoreError,
    },

    /// The task was cancelled before or while processing an entry.
    #[error("Operation aborted")]
    Aborted,

    /// The archiver failed.
    #[error("Archive error: {source}")]
    Archive {
        #[from]
        source: ArchiveError,
    },

    /// Every numbered variant of a destination name is taken.
    #[error("No free name for '{name}' after {limit} attempts")]
    NameExhausted { name: String, limit: u64 },
}

impl OperationError {
    /// Check if this error stems from a cancellation request.
    ///
    /// Callers use this to tell deliberate cancellation apart from failures.
    pub fn is_abort(&self) -> bool {
        matches!(
            self,
            Self::Aborted
                | Self::Filesystem {
                    source: StoreError::Aborted
                }
        )
    }
}
