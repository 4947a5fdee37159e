//! Time-boxed coalescing of high-frequency notifications.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

type Action = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct LimiterState {
    last_run: Option<Instant>,
    timer: Option<JoinHandle<()>>,
}

struct Shared {
    action: Action,
    min_interval: Duration,
    state: Mutex<LimiterState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire_scheduled(&self) {
        {
            let mut state = self.lock();
            if state.timer.take().is_none() {
                // Flushed by run_immediately in the meantime.
                return;
            }
            state.last_run = Some(Instant::now());
        }
        (self.action)();
    }
}

/// Runs an action at most once per interval.
///
/// [`schedule`](Self::schedule) runs the action right away when the last run
/// is older than the interval, and otherwise arms a timer for the remainder.
/// Further calls while the timer is armed coalesce into that one run.
/// [`run_immediately`](Self::run_immediately) flushes an armed timer
/// synchronously so a final value is never dropped by throttling.
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl RateLimiter {
    /// Create a limiter around `action`.
    pub fn new(min_interval: Duration, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            shared: Arc::new(Shared {
                action: Arc::new(action),
                min_interval,
                state: Mutex::new(LimiterState::default()),
            }),
        }
    }

    /// Request a run of the action.
    pub fn schedule(&self) {
        let mut state = self.shared.lock();
        if state.timer.is_some() {
            return;
        }

        let now = Instant::now();
        let deadline = state.last_run.map(|last| last + self.shared.min_interval);
        let runtime = tokio::runtime::Handle::try_current();
        match (deadline, runtime) {
            (Some(deadline), Ok(runtime)) if deadline > now => {
                let shared = Arc::clone(&self.shared);
                state.timer = Some(runtime.spawn(async move {
                    tokio::time::sleep_until(deadline).await;
                    shared.fire_scheduled();
                }));
            }
            _ => {
                state.last_run = Some(now);
                drop(state);
                (self.shared.action)();
            }
        }
    }

    /// Run a pending scheduled action now and disarm its timer.
    ///
    /// Does nothing when no run is pending.
    pub fn run_immediately(&self) {
        {
            let mut state = self.shared.lock();
            let Some(timer) = state.timer.take() else {
                return;
            };
            timer.abort();
            state.last_run = Some(Instant::now());
        }
        (self.shared.action)();
    }

    /// Disarm a pending run without running the action. Returns whether a
    /// run was pending.
    pub fn cancel(&self) -> bool {
        let timer = self.shared.lock().timer.take();
        match timer {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }

    /// Check if a scheduled run is pending.
    pub fn is_pending(&self) -> bool {
        self.shared.lock().timer.is_some()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(timer) = self.shared.lock().timer.take() {
            timer.abort();
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("min_interval", &self.shared.min_interval)
            .field("pending", &self.is_pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_limiter() -> (RateLimiter, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let limiter = RateLimiter::new(Duration::from_millis(200), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (limiter, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_is_immediate() {
        let (limiter, count) = counting_limiter();
        limiter.schedule();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!limiter.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_within_interval_coalesce() {
        let (limiter, count) = counting_limiter();
        limiter.schedule();
        limiter.schedule();
        limiter.schedule();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(limiter.is_pending());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!limiter.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_immediately_flushes_pending() {
        let (limiter, count) = counting_limiter();
        limiter.schedule();
        limiter.schedule();

        limiter.run_immediately();
        assert_eq!(count.load(Ordering::SeqCst), 2);

        // The aborted timer must not fire again.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_immediately_without_pending_is_noop() {
        let (limiter, count) = counting_limiter();
        limiter.run_immediately();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_disarms_without_running() {
        let (limiter, count) = counting_limiter();
        limiter.schedule();
        limiter.schedule();
        assert!(limiter.cancel());
        assert!(!limiter.cancel());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_after_interval_runs_directly() {
        let (limiter, count) = counting_limiter();
        limiter.schedule();
        tokio::time::sleep(Duration::from_millis(300)).await;
        limiter.schedule();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(!limiter.is_pending());
    }
}
