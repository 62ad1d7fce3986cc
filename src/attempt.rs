use tokio_util::sync::CancellationToken;

/// Retry bookkeeping for one logical request.
///
/// Both failure handlers draw from the same `attempts_used` counter, so a
/// transport retry and a status-code retry spend the same budget. Credential
/// retries leave it untouched. Create a fresh value per request; never share
/// one between concurrent requests.
#[derive(Clone, Debug, Default)]
pub struct AttemptState {
    attempts_used: u32,
    cancellation: CancellationToken,
}

impl AttemptState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ties the request to `token`: cancelling it cuts a pending backoff wait
    /// short and makes the retry decision come back `false`.
    pub fn with_cancellation(token: CancellationToken) -> Self {
        Self {
            attempts_used: 0,
            cancellation: token,
        }
    }

    /// Backoff retries granted so far.
    pub fn attempts_used(&self) -> u32 {
        self.attempts_used
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) fn record_retry(&mut self) {
        self.attempts_used = self.attempts_used.saturating_add(1);
    }
}
