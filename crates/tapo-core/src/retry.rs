//! Retry and cancellation orchestration shared by both transports.
//!
//! The executor drives a [`RawExchange`] (one encrypted HTTP round-trip) under
//! a [`RetryPolicy`]. Only transport-level failures are retried: a non-200
//! status or an [`Error::Transport`]. Anything else, such as a decryption or
//! parse failure, is returned from the first attempt that produces it.
//!
//! Cancellation is cooperative. The token is checked before every attempt and
//! after every failed attempt, and the inter-attempt delay is raced against it,
//! so a cancelled caller never triggers another network call.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{error::Error, request::RequestEnvelope};

/// Status code the forbidden-only policy retries on.
const FORBIDDEN: u16 = 403;

/// Retry policy for RPC calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Only retry when the device answered 403.
    pub forbidden_only: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(3),
            forbidden_only: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            forbidden_only: false,
        }
    }

    pub fn with_forbidden_only(mut self, forbidden_only: bool) -> Self {
        self.forbidden_only = forbidden_only;
        self
    }
}

/// Status and body of one round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// One raw round-trip for a request.
///
/// Implementations perform any per-attempt work (encryption, sequence
/// advance) themselves; a non-200 status must be returned as a response, not
/// an error, so the executor can apply the status gate.
#[async_trait]
pub trait RawExchange: Send {
    async fn exchange(&mut self, request: &RequestEnvelope) -> Result<RawResponse, Error>;
}

/// Drives a [`RawExchange`] under an optional [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: Option<RetryPolicy>,
}

impl RetryExecutor {
    /// `None` makes exactly one attempt.
    pub fn new(policy: Option<RetryPolicy>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> Option<&RetryPolicy> {
        self.policy.as_ref()
    }

    fn max_attempts(&self) -> u32 {
        self.policy
            .map(|p| p.max_retries.saturating_add(1))
            .unwrap_or(1)
    }

    /// Runs the exchange until it returns status 200, returning that body.
    pub async fn execute<E>(
        &self,
        cancel: &CancellationToken,
        exchange: &mut E,
        request: &RequestEnvelope,
    ) -> Result<Vec<u8>, Error>
    where
        E: RawExchange + ?Sized,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let (status, err) = match exchange.exchange(request).await {
                Ok(response) if response.status == 200 => {
                    debug!(attempt, bytes = response.body.len(), "exchange succeeded");
                    return Ok(response.body);
                }
                Ok(response) => (
                    Some(response.status),
                    Error::NonSuccessStatus {
                        code: response.status,
                    },
                ),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => (None, err),
            };

            warn!(
                attempt,
                max_attempts,
                status = ?status,
                error = %err,
                method = %request.method,
                "attempt failed"
            );

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let exhausted = attempt >= max_attempts;
            let gated = self
                .policy
                .is_some_and(|p| p.forbidden_only && status != Some(FORBIDDEN));
            if exhausted || gated {
                return Err(Error::RequestFailed {
                    status,
                    cause: Box::new(err),
                });
            }

            let delay = self.policy.map(|p| p.delay).unwrap_or_default();
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
