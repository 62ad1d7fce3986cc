//! The two failure handlers a transport consults before re-sending a request.
//!
//! Both share the backoff budget held in [`AttemptState`]; only the response
//! handler can fall back to credential refresh.

use std::collections::BTreeSet;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header;

use crate::{
    AttemptState, BackoffPolicy, CredentialRefresh, HttpRequest, HttpResponse, RetryConfig,
    Sleeper, TokioSleeper,
};

/// Retries transport-level failures (connect errors, timeouts) with backoff.
#[derive(Clone)]
pub struct TransportFailureHandler {
    backoff: BackoffPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for TransportFailureHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportFailureHandler")
            .field("backoff", &self.backoff)
            .field("sleeper", &"<sleeper>")
            .finish()
    }
}

impl TransportFailureHandler {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Returns `true` after waiting out the backoff interval, `false` once the
    /// budget is spent or the request was cancelled. The caller keeps
    /// `error` and surfaces it unchanged on `false`.
    pub async fn on_transport_failure(
        &self,
        error: &(dyn StdError + Send + Sync + 'static),
        state: &mut AttemptState,
    ) -> bool {
        let Some(interval) = self.backoff.next_interval(state.attempts_used()) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                error = %error,
                attempts_used = state.attempts_used(),
                "retry budget exhausted for transport error"
            );
            return false;
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            error = %error,
            delay_ms = interval.as_millis() as u64,
            "retrying after transport error"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = error;

        backoff_wait(self.sleeper.as_ref(), state, interval).await
    }
}

/// Retries unsuccessful HTTP responses.
///
/// Status codes from the configured retry set get a backoff retry and never
/// reach credential refresh, even when the budget is spent. Everything else
/// is handed to the [`CredentialRefresh`] collaborator, whose retries are
/// immediate and free.
#[derive(Clone)]
pub struct ResponseFailureHandler {
    backoff: BackoffPolicy,
    retry_status_codes: BTreeSet<u16>,
    credentials: Arc<dyn CredentialRefresh>,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for ResponseFailureHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseFailureHandler")
            .field("backoff", &self.backoff)
            .field("retry_status_codes", &self.retry_status_codes)
            .field("credentials", &"<credentials>")
            .field("sleeper", &"<sleeper>")
            .finish()
    }
}

impl ResponseFailureHandler {
    pub fn new(config: &RetryConfig, credentials: Arc<dyn CredentialRefresh>) -> Self {
        Self {
            backoff: BackoffPolicy::new(config),
            retry_status_codes: config.retry_status_codes().clone(),
            credentials,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub async fn on_unsuccessful_response(
        &self,
        request: &mut HttpRequest,
        response: &HttpResponse,
        state: &mut AttemptState,
    ) -> bool {
        if self.retry_status_codes.contains(&response.status.as_u16()) {
            return self.retry_with_backoff(response, state).await;
        }

        let retry = self.credentials.decide(request, response).await;
        if retry {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                status = response.status.as_u16(),
                "retrying with refreshed credentials"
            );
        }
        retry
    }

    async fn retry_with_backoff(&self, response: &HttpResponse, state: &mut AttemptState) -> bool {
        let Some(interval) = self.backoff.next_interval(state.attempts_used()) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                status = response.status.as_u16(),
                attempts_used = state.attempts_used(),
                "retry budget exhausted for http error"
            );
            return false;
        };

        let delay = match retry_after(response, Utc::now()) {
            Some(requested) if requested > self.backoff.max_interval() => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    retry_after_ms = requested.as_millis() as u64,
                    "server asked to wait longer than the max interval, not retrying"
                );
                return false;
            }
            Some(requested) if !requested.is_zero() => requested,
            _ => interval,
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            status = response.status.as_u16(),
            delay_ms = delay.as_millis() as u64,
            "retrying after http error"
        );

        backoff_wait(self.sleeper.as_ref(), state, delay).await
    }
}

/// Sleeps for `delay` unless the request is cancelled first, and counts the
/// retry against the budget when the wait completes.
async fn backoff_wait(sleeper: &dyn Sleeper, state: &mut AttemptState, delay: Duration) -> bool {
    if state.is_cancelled() {
        return false;
    }

    let completed = tokio::select! {
        biased;
        _ = state.cancellation().cancelled() => false,
        _ = sleeper.sleep(delay) => true,
    };

    if completed {
        state.record_retry();
    }
    completed
}

/// Delay requested by a `Retry-After` header, given as delta-seconds or an
/// HTTP date. Dates in the past yield zero. Unparsable values are ignored.
fn retry_after(response: &HttpResponse, now: DateTime<Utc>) -> Option<Duration> {
    let value = response.header(&header::RETRY_AFTER)?.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let millis = date.with_timezone(&Utc).signed_duration_since(now).num_milliseconds();
    Some(Duration::from_millis(millis.max(0) as u64))
}
