//! Bounded concurrency for metadata lookups.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Bounds the number of simultaneously running futures.
///
/// Recursing through large trees issues one size lookup per file; running
/// them all at once would flood the transport behind the file store.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting `capacity` futures at a time.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Maximum number of concurrently running futures.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of free slots right now.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Run `future` once a slot is free, holding the slot until it finishes.
    pub async fn run<F: Future>(&self, future: F) -> F::Output {
        // The semaphore is never closed.
        let _permit = self.slots.acquire().await;
        future.await
    }
}
