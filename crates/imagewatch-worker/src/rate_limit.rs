//! Token bucket admission gate for outbound scan calls.
//!
//! Each worker owns its own bucket, so the aggregate outbound rate is
//! `concurrency × rate`.

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation fired while waiting for a token.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Cancelled while waiting for rate limit token")]
pub struct Cancelled;

/// Token bucket with a steady refill rate and a burst capacity.
///
/// Waiting never drops a request; it only delays it.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// `rate` is tokens per second and must be positive; `burst` must be at
    /// least 1 (both are checked by `RunConfig::validate`).
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            rate,
            burst,
            tokens: burst,
            last: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last = now;
    }

    /// Take a token if one is available right now.
    #[cfg(test)]
    fn try_acquire(&mut self) -> bool {
        self.refill(Instant::now());
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait until a token is available or `shutdown` fires.
    ///
    /// The token is reserved up front; if cancellation wins the reservation
    /// is returned to the bucket.
    pub async fn acquire(&mut self, shutdown: &CancellationToken) -> Result<(), Cancelled> {
        if shutdown.is_cancelled() {
            return Err(Cancelled);
        }

        self.refill(Instant::now());
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            return Ok(());
        }

        // Tiny rates overflow Duration; tokio treats MAX as a far-future deadline.
        let wait = Duration::try_from_secs_f64(-self.tokens / self.rate).unwrap_or(Duration::MAX);
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                self.tokens += 1.0;
                Err(Cancelled)
            }
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}
