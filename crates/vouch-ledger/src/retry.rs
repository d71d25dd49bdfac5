//! Bounded retry with exponential backoff for ledger calls.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::warn;

use crate::error::{LedgerError, SourceError};

/// Retry policy injected into everything that talks to the ledger.
///
/// Only [`SourceError::Unavailable`] is retried. Terminal errors are
/// returned on first sight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before the retry following failed attempt `attempt` (0-indexed).
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let millis = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Run `op` until it succeeds, fails terminally, or attempts run out.
    ///
    /// With a `deadline`, each attempt is bounded by it and no backoff sleep
    /// extends past it; running out of time yields [`LedgerError::Timeout`].
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        deadline: Option<Instant>,
        mut op: F,
    ) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SourceError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, op())
                    .await
                    .map_err(|_| LedgerError::Timeout)?,
                None => op().await,
            };

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_retryable() => return Err(LedgerError::Source(err)),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                return Err(LedgerError::LedgerUnavailable {
                    attempts: attempt,
                    reason: err.to_string(),
                });
            }

            let backoff = self.backoff_for_attempt(attempt - 1);
            if deadline.is_some_and(|deadline| Instant::now() + backoff >= deadline) {
                return Err(LedgerError::Timeout);
            }
            warn!(
                operation,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "ledger call failed; retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}
