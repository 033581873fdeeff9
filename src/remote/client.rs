use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use super::{HttpReply, RemoteRequest, RemoteResponse, Transport, TransportError};
use crate::clock::Clock;
use crate::credential::Credential;

/// Bounded retry with exponential backoff for transient failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to 50% random jitter on top of each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let spread = delay.as_millis() as u64 / 2;
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RemoteFailure {
    #[error("Wolfram|Alpha unreachable after {attempts} attempt(s): {cause}")]
    Exhausted { attempts: u32, cause: String },
    #[error("Wolfram|Alpha rejected the request (HTTP {status})")]
    Rejected { status: u16 },
    #[error("Wolfram|Alpha rejected the configured app id (HTTP {status})")]
    CredentialRejected { status: u16 },
    #[error("Request to Wolfram|Alpha could not be sent: {0}")]
    Unsendable(String),
    #[error("Request to Wolfram|Alpha was cancelled")]
    Cancelled,
}

/// Outcome of a single attempt.
#[derive(Debug)]
enum Attempt {
    Complete(RemoteResponse),
    Transient(String),
    Permanent(RemoteFailure),
}

fn classify_reply(reply: HttpReply) -> Attempt {
    match reply.status {
        200..=299 => Attempt::Complete(RemoteResponse::from_body(reply.body)),
        429 => Attempt::Complete(RemoteResponse::Throttled),
        401 | 403 => Attempt::Permanent(RemoteFailure::CredentialRejected {
            status: reply.status,
        }),
        408 | 500..=599 => Attempt::Transient(format!("HTTP {}", reply.status)),
        status => Attempt::Permanent(RemoteFailure::Rejected { status }),
    }
}

fn classify_error(err: TransportError) -> Attempt {
    if err.is_transient() {
        Attempt::Transient(err.to_string())
    } else {
        Attempt::Permanent(RemoteFailure::Unsendable(err.to_string()))
    }
}

/// Executes engine calls with timeout-aware retry and backoff.
pub struct EngineClient {
    transport: Arc<dyn Transport>,
    credential: Credential,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl EngineClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        credential: Credential,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            credential,
            retry,
            clock,
        }
    }

    /// Run the request, retrying transient failures up to `max_retries`
    /// times. Permanent failures and engine replies return immediately.
    /// A cancelled token stops the loop before the next attempt or sleep.
    pub async fn execute(
        &self,
        request: &RemoteRequest,
        cancel: &CancellationToken,
    ) -> Result<RemoteResponse, RemoteFailure> {
        let mut retry = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(RemoteFailure::Cancelled);
            }

            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Err(RemoteFailure::Cancelled),
                sent = self.transport.send(request, &self.credential) => match sent {
                    Ok(reply) => classify_reply(reply),
                    Err(err) => classify_error(err),
                },
            };

            let cause = match attempt {
                Attempt::Complete(response) => return Ok(response),
                Attempt::Permanent(failure) => return Err(failure),
                Attempt::Transient(cause) => cause,
            };

            if retry >= self.retry.max_retries {
                return Err(RemoteFailure::Exhausted {
                    attempts: retry + 1,
                    cause,
                });
            }

            let delay = self.retry.delay_for(retry);
            tracing::warn!(
                attempt = retry + 1,
                delay_ms = delay.as_millis() as u64,
                %cause,
                "transient engine failure, retrying"
            );

            tokio::select! {
                _ = cancel.cancelled() => return Err(RemoteFailure::Cancelled),
                _ = self.clock.sleep(delay) => {}
            }
            retry += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
            jitter: false,
        };
        let delays: Vec<_> = (0..4).map(|n| policy.backoff(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
            ]
        );
    }

    #[test]
    fn jitter_stays_within_half_the_delay() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.delay_for(1);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn status_classes() {
        assert!(matches!(
            classify_reply(HttpReply::new(503, "")),
            Attempt::Transient(_)
        ));
        assert!(matches!(
            classify_reply(HttpReply::new(429, "")),
            Attempt::Complete(RemoteResponse::Throttled)
        ));
        assert!(matches!(
            classify_reply(HttpReply::new(403, "")),
            Attempt::Permanent(RemoteFailure::CredentialRejected { status: 403 })
        ));
        assert!(matches!(
            classify_reply(HttpReply::new(400, "")),
            Attempt::Permanent(RemoteFailure::Rejected { status: 400 })
        ));
    }
}
