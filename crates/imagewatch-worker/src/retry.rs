//! Rate-limited submission with retry and exponential backoff.
//!
//! Per request: wait for a token, call the scan client once, and on a
//! retryable failure back off (1, 2, 4, ... units) before the next attempt.
//! The last attempt's failure is terminal. Cancellation aborts at any wait
//! and is never counted as exhaustion.

use std::time::Duration;

use imagewatch_core::ScanRequest;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::RunConfig;
use crate::rate_limit::TokenBucket;
use crate::scan_client::{ScanClient, ScanError};

/// Why a request could not be submitted.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Cancelled")]
    Cancelled,

    #[error("failed after retries ({attempts} attempts): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ScanError,
    },
}

/// Attempt budget and backoff unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per request, at least 1.
    pub max_attempts: u32,

    /// Backoff time-unit.
    pub backoff_base: Duration,
}

impl RetryPolicy {
    /// Build the policy from run configuration.
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            backoff_base: config.backoff_base,
        }
    }

    /// Delay before the given 1-based attempt: zero for the first, then
    /// `2^(attempt-2)` units.
    pub fn backoff_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }
}

/// Submit one request under the retry policy.
///
/// Returns the number of attempts used on success.
pub async fn process(
    request: &ScanRequest,
    client: &dyn ScanClient,
    limiter: &mut TokenBucket,
    policy: &RetryPolicy,
    shutdown: &CancellationToken,
) -> Result<u32, ProcessError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let backoff = policy.backoff_before(attempt);
        if !backoff.is_zero() {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(ProcessError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        limiter
            .acquire(shutdown)
            .await
            .map_err(|_| ProcessError::Cancelled)?;

        match client.monitor_image(request, shutdown).await {
            Ok(()) => return Ok(attempt),
            Err(e) if !e.is_retryable() => return Err(ProcessError::Cancelled),
            Err(e) if attempt >= max_attempts => {
                return Err(ProcessError::Exhausted {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => {
                debug!(image = %request.image, attempt, error = %e, "Attempt failed, backing off");
            }
        }

        attempt += 1;
    }
}
