//! Progress reporting types for file operations.

use serde::{Deserialize, Serialize};

/// The type of operation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationType {
    Copy,
    Move,
    Zip,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "Copy"),
            Self::Move => write!(f, "Move"),
            Self::Zip => write!(f, "Zip"),
        }
    }
}

/// Snapshot of a task's progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// The type of operation.
    pub operation_type: OperationType,
    /// Number of resolved items not yet completed.
    pub num_remaining_items: usize,
    /// Total bytes to process.
    pub total_bytes: u64,
    /// Bytes processed so far.
    pub processed_bytes: u64,
    /// Name of the source entry being processed, empty when none is.
    pub processing_entry_name: String,
    /// Name of the target directory.
    pub target_dir_name: String,
    /// Recent transfer speed in bytes per second.
    pub current_speed: u64,
    /// Average transfer speed in bytes per second.
    pub average_speed: u64,
    /// Estimated remaining time in seconds, 0 when unknown.
    pub remaining_time: u64,
}

impl TaskStatus {
    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.total_bytes > 0 {
            (self.processed_bytes as f64 / self.total_bytes as f64) * 100.0
        } else {
            0.0
        }
    }
}

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalReason {
    Success,
    Cancelled,
    Error,
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}
