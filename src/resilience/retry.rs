// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff and jitter.
//!
//! Only errors whose code is in the retryable set are retried; anything else
//! (validation failures, not-found, permission problems) propagates on the
//! first attempt so programming errors are never masked as transient.
//!
//! Delay before retry `n` (0-based) is `base_delay * 2^n + U[0, max_jitter)`.
//!
//! # Example
//!
//! ```
//! use backend_bridge::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig::default();
//! assert_eq!(config.max_retries, 3);
//! assert_eq!(config.base_delay, Duration::from_millis(1000));
//! assert!(config.retryable_codes.contains("unavailable"));
//!
//! // Query: quick retry, then fail
//! let query = RetryConfig::query();
//! assert!(query.base_delay < config.base_delay);
//! ```

use rand::Rng;
use serde::Deserialize;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Codes retried by default: the transient half of the error taxonomy.
pub const DEFAULT_RETRYABLE_CODES: [&str; 4] =
    ["unavailable", "deadline-exceeded", "resource-exhausted", "internal"];

/// Errors that can be classified for retry.
pub trait RetryableError: std::fmt::Display {
    /// Machine-readable error code, if the error carries one.
    fn error_code(&self) -> Option<&str>;
}

/// Configuration for operation retry behavior.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt; total attempts ≤ `max_retries + 1`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(
        rename = "base_delay_ms",
        default = "default_base_delay",
        with = "crate::config::serde_millis"
    )]
    pub base_delay: Duration,
    /// Upper bound (exclusive) of the random term added to each delay
    #[serde(
        rename = "max_jitter_ms",
        default = "default_max_jitter",
        with = "crate::config::serde_millis"
    )]
    pub max_jitter: Duration,
    #[serde(default = "default_retryable_codes")]
    pub retryable_codes: HashSet<String>,
}

fn default_max_retries() -> u32 { 3 }
fn default_base_delay() -> Duration { Duration::from_millis(1000) }
fn default_max_jitter() -> Duration { Duration::from_millis(1000) }
fn default_retryable_codes() -> HashSet<String> {
    DEFAULT_RETRYABLE_CODES.iter().map(|c| c.to_string()).collect()
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_base_delay(),
            max_jitter: default_max_jitter(),
            retryable_codes: default_retryable_codes(),
        }
    }
}

impl RetryConfig {
    /// Fast-fail retry for initial connections to a shared tier.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_millis(200),
            max_jitter: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Quick retry for individual queries (don't block the caller for long).
    #[must_use]
    pub fn query() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_jitter: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Never retry.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Fast retry for tests (minimal delays, no jitter)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Decide whether `err` is worth another attempt.
    ///
    /// Errors that carry a code are judged by the code alone. Uncoded errors
    /// fall back to looking for a retryable code in the message.
    pub fn is_retryable<E: RetryableError + ?Sized>(&self, err: &E) -> bool {
        match err.error_code() {
            Some(code) => self.retryable_codes.contains(code),
            None => {
                let message = err.to_string().to_ascii_lowercase();
                self.retryable_codes.iter().any(|code| {
                    message.contains(code.as_str()) || message.contains(&code.replace('-', " "))
                })
            }
        }
    }
}

/// Delay before retry number `attempt` (0 for the first retry).
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponential = config
        .base_delay
        .checked_mul(2u32.saturating_pow(attempt))
        .unwrap_or(Duration::MAX);

    let jitter_ms = config.max_jitter.as_millis() as u64;
    let jitter = if jitter_ms > 0 {
        Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    } else {
        Duration::ZERO
    };

    exponential.saturating_add(jitter)
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent. The last error is returned unchanged.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut attempt: u32 = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempt > 0 {
                    info!("Operation '{}' succeeded after {} retries", operation_name, attempt);
                }
                return Ok(val);
            }
            Err(err) => {
                if !config.is_retryable(&err) {
                    debug!(operation = operation_name, error = %err, "Non-retryable error");
                    return Err(err);
                }
                if attempt >= config.max_retries {
                    warn!(
                        "Operation '{}' failed after {} attempts: {}",
                        operation_name,
                        attempt + 1,
                        err
                    );
                    return Err(err);
                }

                let delay = backoff_delay(config, attempt);
                warn!(
                    "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                    operation_name,
                    attempt + 1,
                    config.max_retries + 1,
                    err,
                    delay
                );
                crate::metrics::record_retry(operation_name);

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
