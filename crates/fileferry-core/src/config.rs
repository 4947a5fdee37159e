//! Task configuration types.

use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

const DEFAULT_CONCURRENCY_LIMIT: usize = 64;
const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 200;
const DEFAULT_ENTRY_CHANGED_INTERVAL_MS: u64 = 500;
const DEFAULT_CONSECUTIVE_ERROR_LIMIT: usize = 100;
const DEFAULT_MAX_COPY_NUMBER: u64 = 10_000;
const DEFAULT_SPEED_WINDOW: usize = 20;

/// Configuration shared by every task of an operation manager.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct TaskConfig {
    /// Maximum number of simultaneous size lookups during tree resolution.
    #[builder(default = "DEFAULT_CONCURRENCY_LIMIT")]
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Minimum interval between two progress notifications of a task.
    #[builder(default = "DEFAULT_PROGRESS_INTERVAL_MS")]
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Minimum interval between two batched entry-changed notifications.
    #[builder(default = "DEFAULT_ENTRY_CHANGED_INTERVAL_MS")]
    #[serde(default = "default_entry_changed_interval_ms")]
    pub entry_changed_interval_ms: u64,

    /// Back-to-back per-entry failures a copy tolerates before giving up.
    #[builder(default = "DEFAULT_CONSECUTIVE_ERROR_LIMIT")]
    #[serde(default = "default_consecutive_error_limit")]
    pub consecutive_error_limit: usize,

    /// Highest number of " (N)" variants tried when deduplicating a name.
    #[builder(default = "DEFAULT_MAX_COPY_NUMBER")]
    #[serde(default = "default_max_copy_number")]
    pub max_copy_number: u64,

    /// Number of speed samples averaged for the current transfer speed.
    #[builder(default = "DEFAULT_SPEED_WINDOW")]
    #[serde(default = "default_speed_window")]
    pub speed_window: usize,
}

fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_progress_interval_ms() -> u64 {
    DEFAULT_PROGRESS_INTERVAL_MS
}

fn default_entry_changed_interval_ms() -> u64 {
    DEFAULT_ENTRY_CHANGED_INTERVAL_MS
}

fn default_consecutive_error_limit() -> usize {
    DEFAULT_CONSECUTIVE_ERROR_LIMIT
}

fn default_max_copy_number() -> u64 {
    DEFAULT_MAX_COPY_NUMBER
}

fn default_speed_window() -> usize {
    DEFAULT_SPEED_WINDOW
}

impl TaskConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.concurrency_limit == Some(0) {
            return Err("Concurrency limit must be at least 1".to_string());
        }
        if self.consecutive_error_limit == Some(0) {
            return Err("Consecutive error limit must be at least 1".to_string());
        }
        if self.max_copy_number == Some(0) {
            return Err("Max copy number must be at least 1".to_string());
        }
        if self.speed_window == Some(0) {
            return Err("Speed window must be at least 1".to_string());
        }
        Ok(())
    }
}

impl TaskConfig {
    /// Create a new task config builder.
    pub fn builder() -> TaskConfigBuilder {
        TaskConfigBuilder::default()
    }

    /// Progress throttling interval.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Entry-changed batching interval.
    pub fn entry_changed_interval(&self) -> Duration {
        Duration::from_millis(self.entry_changed_interval_ms)
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            entry_changed_interval_ms: DEFAULT_ENTRY_CHANGED_INTERVAL_MS,
            consecutive_error_limit: DEFAULT_CONSECUTIVE_ERROR_LIMIT,
            max_copy_number: DEFAULT_MAX_COPY_NUMBER,
            speed_window: DEFAULT_SPEED_WINDOW,
        }
    }
}
