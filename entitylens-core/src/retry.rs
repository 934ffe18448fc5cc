//! Exponential backoff retry for transient backend errors.
//!
//! Generic over the error type: both LLM and browser errors classify their
//! own retryability through the `Retryable` trait. Permanent errors return
//! immediately without consuming retry budget.

use crate::error::{BrowserError, LlmError};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Retry/backoff tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Errors that can distinguish transient from permanent failures.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Server-mandated minimum delay before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Connection { .. }
                | LlmError::Timeout { .. }
                | LlmError::ApiRequest { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}

impl Retryable for BrowserError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrowserError::NavigationFailed { .. } | BrowserError::Timeout { .. }
        )
    }
}

/// Execute an async operation with exponential backoff on transient errors.
///
/// Permanent errors (per `Retryable::is_retryable`) return immediately.
/// Rate-limit errors wait at least the server's retry-after.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !e.is_retryable() || attempt == config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, e.retry_after());
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// Backoff delay for the given attempt, respecting any server retry-after.
fn compute_backoff(config: &RetryConfig, attempt: u32, retry_after: Option<Duration>) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    match retry_after {
        Some(d) => (d.as_millis() as u64).max(computed),
        None => computed,
    }
}

/// Pure exponential backoff with optional jitter.
fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Up to 25% jitter
        let jitter = (capped as f64 * 0.25 * rand_simple()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Simple pseudo-random for jitter (avoids pulling in the rand crate).
fn rand_simple() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}
