//! Exponential backoff retry for GitHub API calls.
//!
//! Transient errors are retried 3 times with 2s, 4s and 8s delays by default.
//! Permanent errors are returned immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use super::error::GitHubApiError;

/// Configuration for exponential backoff retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,

    /// Delay before the first retry.
    pub initial_delay: Duration,

    /// Cap on the delay between retries.
    pub max_delay: Duration,

    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// 3 retries with 2s, 4s, 8s delays.
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
        backoff_multiplier: 2.0,
    };

    /// No retries at all.
    pub const NONE: Self = Self {
        max_retries: 0,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 1.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Delay before retry `attempt` (0-indexed), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    /// Returns an iterator over all retry delays.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runs `operation`, retrying transient failures according to `config`.
///
/// `what` names the operation in retry logs.
pub async fn retry_with_backoff<T, F, Fut>(
    config: RetryConfig,
    what: &str,
    mut operation: F,
) -> Result<T, GitHubApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitHubApiError>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind.is_retriable() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                attempt += 1;
                warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient GitHub error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Like [`retry_with_backoff`], for calls that create something.
///
/// A transient failure can arrive after the server already applied the
/// request, so before each retry `find_existing` is asked for that result.
/// If it finds one, it is returned instead of creating a duplicate.
pub async fn retry_create_with_backoff<T, C, CFut, L, LFut>(
    config: RetryConfig,
    what: &str,
    mut create: C,
    mut find_existing: L,
) -> Result<T, GitHubApiError>
where
    C: FnMut() -> CFut,
    CFut: Future<Output = Result<T, GitHubApiError>>,
    L: FnMut() -> LFut,
    LFut: Future<Output = Result<Option<T>, GitHubApiError>>,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            match find_existing().await {
                Ok(Some(existing)) => {
                    info!(operation = what, attempt, "Earlier attempt succeeded, not retrying");
                    return Ok(existing);
                }
                Ok(None) => {}
                Err(e) => warn!(operation = what, error = %e, "Failed to look up earlier attempt"),
            }
        }

        match create().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind.is_retriable() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                attempt += 1;
                warn!(
                    operation = what,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient GitHub error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
