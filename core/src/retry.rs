//! Retry with fixed or exponential backoff.
//!
//! [`RetryExecutor`] runs a single asynchronous operation, retrying failures
//! the predicate classifies as transient. Waits between attempts are
//! non-blocking and race the caller's [`CancellationToken`].

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::errors::TransferError;

/// Upper bound on the backoff exponent so the shift cannot overflow.
const MAX_BACKOFF_EXPONENT: u32 = 20;

/// Retry policy for one backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOptions {
    /// Additional attempts permitted after the first failure.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_use_exponential_backoff")]
    pub use_exponential_backoff: bool,
    /// Fraction of the delay randomly added or removed, clamped to `[0, 1]`.
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            use_exponential_backoff: default_use_exponential_backoff(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_use_exponential_backoff() -> bool {
    true
}

fn default_jitter_factor() -> f64 {
    0.2
}

/// Executes operations under a [`RetryOptions`] policy.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    options: RetryOptions,
}

impl RetryExecutor {
    pub fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RetryOptions {
        &self.options
    }

    /// Backoff before the attempt following failed attempt `attempt` (1-based),
    /// without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let base = self.options.base_delay_ms;
        let ms = if self.options.use_exponential_backoff {
            let exponent = attempt.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
            base.saturating_mul(1u64 << exponent)
        } else {
            base
        };
        Duration::from_millis(ms)
    }

    /// Backoff before the attempt following failed attempt `attempt`,
    /// with jitter applied.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for(attempt);
        let factor = self.options.jitter_factor;
        // NaN or infinite factors disable jitter.
        let factor = if factor.is_finite() {
            factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if factor == 0.0 || base.is_zero() {
            return base;
        }
        let spread = rand::thread_rng().gen_range(-factor..=factor);
        let ms = base.as_millis() as f64 * (1.0 + spread);
        Duration::from_millis(ms.max(0.0).round() as u64)
    }

    /// Run `operation`, retrying errors for which
    /// [`TransferError::is_transient`] holds.
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
        cancel: &CancellationToken,
    ) -> Result<T, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
    {
        self.execute_with(operation_name, operation, TransferError::is_transient, cancel)
            .await
    }

    /// Run `operation`, retrying errors accepted by `is_retryable`.
    ///
    /// Non-retryable errors are returned as-is after the first occurrence.
    /// Once `max_retries + 1` attempts have failed the last error is wrapped
    /// in [`TransferError::RetryExhausted`]. Cancellation before an attempt,
    /// during an attempt or during a backoff wait yields
    /// [`TransferError::Cancelled`].
    pub async fn execute_with<T, F, Fut, P>(
        &self,
        operation_name: &str,
        mut operation: F,
        is_retryable: P,
        cancel: &CancellationToken,
    ) -> Result<T, TransferError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransferError>>,
        P: Fn(&TransferError) -> bool,
    {
        let max_attempts = self.options.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                result = operation() => result,
            };

            let err = match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(TransferError::Cancelled) => return Err(TransferError::Cancelled),
                Err(e) if !is_retryable(&e) => return Err(e),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                error!(
                    operation = operation_name,
                    attempts = attempt,
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(TransferError::RetryExhausted {
                    operation: operation_name.to_string(),
                    attempts: attempt,
                    source: Box::new(err),
                });
            }

            let delay = self.delay_for(attempt);
            warn!(
                operation = operation_name,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
