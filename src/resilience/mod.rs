// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience primitives shared by every provider.
//!
//! ```text
//! provider call
//!     → circuit_breaker.rs (fail fast while the (provider, operation) pair is open)
//!     → retry.rs (retry transient error codes with exponential backoff + jitter)
//!     → raw backend call
//! ```

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitConfig, CircuitError, CircuitRegistry, CircuitSnapshot, CircuitState,
};
pub use retry::{backoff_delay, retry, RetryConfig, RetryableError, DEFAULT_RETRYABLE_CODES};
