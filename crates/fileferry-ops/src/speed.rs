//! Transfer speed and remaining time estimation.

use std::collections::VecDeque;

use tokio::time::Instant;

/// Tracks transfer speed from successive processed-byte counts.
///
/// Every update turns the bytes processed since the previous one into an
/// instantaneous speed, kept in a ring buffer of the last `window` samples.
/// The current speed is the mean of that buffer; the average speed is the
/// cumulative moving average over all samples.
#[derive(Debug, Clone)]
pub struct Speedometer {
    window: usize,
    samples: VecDeque<u64>,
    count: u64,
    cumulative_average: f64,
    last_timestamp: Instant,
    last_processed_bytes: u64,
    total_bytes: u64,
}

impl Speedometer {
    /// Create a speedometer averaging over `window` samples.
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            count: 0,
            cumulative_average: 0.0,
            last_timestamp: Instant::now(),
            last_processed_bytes: 0,
            total_bytes: 0,
        }
    }

    /// Set the total bytes the task handles.
    pub fn set_total_bytes(&mut self, total_bytes: u64) {
        self.total_bytes = total_bytes;
    }

    /// Record the task's processed byte count.
    pub fn update(&mut self, processed_bytes: u64) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_timestamp);
        if elapsed.is_zero() {
            // Folded into the next sample.
            return;
        }

        let delta = processed_bytes.saturating_sub(self.last_processed_bytes);
        let speed = (delta as f64 / elapsed.as_secs_f64()).floor() as u64;

        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(speed);

        self.count += 1;
        self.cumulative_average += (speed as f64 - self.cumulative_average) / self.count as f64;

        self.last_processed_bytes = processed_bytes;
        self.last_timestamp = now;
    }

    /// Mean speed over the sample window, in bytes per second.
    pub fn current_speed(&self) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        self.samples.iter().sum::<u64>() / self.samples.len() as u64
    }

    /// Cumulative average speed, in bytes per second.
    pub fn average_speed(&self) -> u64 {
        self.cumulative_average as u64
    }

    /// Estimated seconds until completion, 0 when the speed is unknown.
    pub fn remaining_time(&self) -> u64 {
        let speed = self.current_speed();
        if speed == 0 {
            return 0;
        }
        self.total_bytes
            .saturating_sub(self.last_processed_bytes)
            .div_ceil(speed)
    }
}
