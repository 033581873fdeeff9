//! Token-bucket rate governor guarding the engine quota.
//!
//! Policy: a call that finds a token proceeds immediately. A call that
//! finds the bucket empty reserves the next token and waits for it, as long
//! as that wait is no longer than `max_wait`; otherwise it is rejected with
//! [`GovernorError::Limited`] straight away. Reservations drive the token
//! count negative so concurrent waiters queue behind each other instead of
//! all waking for the same token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst size).
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_per_sec: f64,
    /// Longest a call may queue for a token before being rejected.
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    /// Free-tier aligned: one call per second, queue up to five seconds.
    fn default() -> Self {
        Self {
            capacity: 1,
            refill_per_sec: 1.0,
            max_wait: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Immediate,
    Delayed(Duration),
    Rejected { retry_after: Duration },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GovernorError {
    #[error("Local rate limit reached; retry after {} ms", retry_after.as_millis())]
    Limited { retry_after: Duration },
    #[error("Cancelled while waiting for a rate-limit token")]
    Cancelled,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Duration,
}

pub struct RateGovernor {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    bucket: Mutex<Bucket>,
}

impl RateGovernor {
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let bucket = Bucket {
            tokens: f64::from(config.capacity),
            last_refill: clock.now(),
        };
        Self {
            config,
            clock,
            bucket: Mutex::new(bucket),
        }
    }

    /// Decide admission for one call. Token consumption is serialized.
    pub async fn admit(&self) -> Admission {
        let mut bucket = self.bucket.lock().await;
        let now = self.clock.now();

        let elapsed = now.saturating_sub(bucket.last_refill).as_secs_f64();
        bucket.tokens =
            (bucket.tokens + elapsed * self.config.refill_per_sec).min(f64::from(self.config.capacity));
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Admission::Immediate;
        }

        let wait = self.time_until_token(bucket.tokens);
        if wait > self.config.max_wait {
            return Admission::Rejected { retry_after: wait };
        }

        bucket.tokens -= 1.0;
        Admission::Delayed(wait)
    }

    /// Admit, sleeping through a granted delay. Rejections are immediate.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), GovernorError> {
        if cancel.is_cancelled() {
            return Err(GovernorError::Cancelled);
        }

        match self.admit().await {
            Admission::Immediate => Ok(()),
            Admission::Rejected { retry_after } => {
                tracing::warn!(retry_after_ms = retry_after.as_millis() as u64, "local rate limit reached");
                Err(GovernorError::Limited { retry_after })
            }
            Admission::Delayed(wait) => {
                tracing::debug!(wait_ms = wait.as_millis() as u64, "queued for rate-limit token");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        self.release().await;
                        Err(GovernorError::Cancelled)
                    }
                    _ = self.clock.sleep(wait) => Ok(()),
                }
            }
        }
    }

    /// Return a reservation whose holder gave up before using it.
    async fn release(&self) {
        let mut bucket = self.bucket.lock().await;
        bucket.tokens = (bucket.tokens + 1.0).min(f64::from(self.config.capacity));
    }

    /// Refill the bucket to capacity and forget queued reservations.
    pub async fn reset(&self) {
        let mut bucket = self.bucket.lock().await;
        bucket.tokens = f64::from(self.config.capacity);
        bucket.last_refill = self.clock.now();
    }

    fn time_until_token(&self, tokens: f64) -> Duration {
        if self.config.refill_per_sec <= 0.0 {
            return Duration::MAX;
        }
        Duration::try_from_secs_f64((1.0 - tokens) / self.config.refill_per_sec).unwrap_or(Duration::MAX)
    }
}
