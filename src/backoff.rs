use std::time::Duration;

use crate::RetryConfig;

/// Exponential backoff schedule derived from a [`RetryConfig`].
///
/// Holds no per-request state: the wait for a retry depends only on how many
/// backoff retries the request has already used.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    max_retries: u32,
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed_time: Duration,
}

impl BackoffPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries(),
            initial_interval: config.initial_interval(),
            multiplier: config.multiplier(),
            max_interval: config.max_interval(),
            max_elapsed_time: config.max_elapsed_time(),
        }
    }

    /// Wait before the retry that follows `attempts_used` earlier retries,
    /// or `None` once the request has to give up.
    pub fn next_interval(&self, attempts_used: u32) -> Option<Duration> {
        if attempts_used >= self.max_retries {
            return None;
        }

        let mut elapsed = Duration::ZERO;
        for attempt in 0..=attempts_used {
            elapsed = elapsed.saturating_add(self.interval(attempt));
        }
        if elapsed > self.max_elapsed_time {
            return None;
        }

        Some(self.interval(attempts_used))
    }

    /// `min(initial * multiplier^attempt, max_interval)`, in whole milliseconds.
    pub fn interval(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let raw_ms = self.initial_interval.as_millis() as f64 * self.multiplier.powi(exp);
        let max_ms = self.max_interval.as_millis() as f64;

        if !raw_ms.is_finite() || raw_ms >= max_ms {
            return self.max_interval;
        }
        Duration::from_millis(raw_ms as u64)
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }
}
