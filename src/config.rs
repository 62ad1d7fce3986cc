use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

const DEFAULT_MAX_RETRIES: u32 = 10;
const DEFAULT_INITIAL_INTERVAL_MS: u64 = 500;
const DEFAULT_MULTIPLIER: f64 = 2.0;
const DEFAULT_MAX_INTERVAL_MS: u64 = 2 * 60 * 1000;
const DEFAULT_MAX_ELAPSED_TIME_MS: u64 = 15 * 60 * 1000;

/// Immutable retry settings shared by every request of a client.
///
/// Built once through [`RetryConfig::builder`] and cloned freely.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    max_retries: u32,
    retry_status_codes: BTreeSet<u16>,
    initial_interval: Duration,
    multiplier: f64,
    max_interval: Duration,
    max_elapsed_time: Duration,
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Maximum number of backoff retries after the initial attempt.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// HTTP status codes eligible for backoff retry. Empty means none are.
    pub fn retry_status_codes(&self) -> &BTreeSet<u16> {
        &self.retry_status_codes
    }

    pub fn is_retry_status(&self, status: u16) -> bool {
        self.retry_status_codes.contains(&status)
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Upper bound for a single wait, also the longest `Retry-After` honored.
    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Upper bound for the sum of all waits of one request.
    pub fn max_elapsed_time(&self) -> Duration {
        self.max_elapsed_time
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_status_codes: BTreeSet::new(),
            initial_interval: Duration::from_millis(DEFAULT_INITIAL_INTERVAL_MS),
            multiplier: DEFAULT_MULTIPLIER,
            max_interval: Duration::from_millis(DEFAULT_MAX_INTERVAL_MS),
            max_elapsed_time: Duration::from_millis(DEFAULT_MAX_ELAPSED_TIME_MS),
        }
    }
}

/// Builder for [`RetryConfig`].
///
/// Also deserializable, so the retry section of a host application's config
/// file can be read straight into it and then validated with [`build`](Self::build).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfigBuilder {
    max_retries: u32,
    retry_status_codes: Vec<u16>,
    initial_interval_ms: u64,
    multiplier: f64,
    max_interval_ms: u64,
    max_elapsed_time_ms: u64,
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_status_codes: Vec::new(),
            initial_interval_ms: DEFAULT_INITIAL_INTERVAL_MS,
            multiplier: DEFAULT_MULTIPLIER,
            max_interval_ms: DEFAULT_MAX_INTERVAL_MS,
            max_elapsed_time_ms: DEFAULT_MAX_ELAPSED_TIME_MS,
        }
    }
}

impl RetryConfigBuilder {
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_status_codes<I>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        self.retry_status_codes = codes.into_iter().collect();
        self
    }

    pub fn initial_interval_ms(mut self, millis: u64) -> Self {
        self.initial_interval_ms = millis;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_interval_ms(mut self, millis: u64) -> Self {
        self.max_interval_ms = millis;
        self
    }

    pub fn max_elapsed_time_ms(mut self, millis: u64) -> Self {
        self.max_elapsed_time_ms = millis;
        self
    }

    /// Validates the settings and freezes them.
    pub fn build(self) -> Result<RetryConfig> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "multiplier must be a finite value >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.initial_interval_ms > self.max_interval_ms {
            return Err(Error::InvalidConfig(format!(
                "initial interval {} ms exceeds max interval {} ms",
                self.initial_interval_ms, self.max_interval_ms
            )));
        }

        Ok(RetryConfig {
            max_retries: self.max_retries,
            retry_status_codes: self.retry_status_codes.into_iter().collect(),
            initial_interval: Duration::from_millis(self.initial_interval_ms),
            multiplier: self.multiplier,
            max_interval: Duration::from_millis(self.max_interval_ms),
            max_elapsed_time: Duration::from_millis(self.max_elapsed_time_ms),
        })
    }
}
