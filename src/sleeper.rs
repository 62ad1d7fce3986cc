use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

/// Waits between retry attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleeper that returns immediately and records every requested wait.
///
/// Clones share the same record, so a test can keep one handle and give
/// another to the handler under test.
#[derive(Clone, Debug, Default)]
pub struct MockSleeper {
    calls: Arc<Mutex<Vec<Duration>>>,
}

impl MockSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times `sleep` was called.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Requested durations, in call order.
    pub fn durations(&self) -> Vec<Duration> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Duration>> {
        // The record stays usable even if a panicking test poisoned it.
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Sleeper for MockSleeper {
    async fn sleep(&self, duration: Duration) {
        self.lock().push(duration);
    }
}
