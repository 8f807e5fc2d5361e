// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-operation circuit breakers.
//!
//! Protects callers from hammering a backend that keeps failing. Each breaker
//! counts consecutive failures for one (provider, operation) pair and trips
//! once the threshold is reached.
//!
//! ```text
//! Closed ──(failures ≥ threshold)──► Open ──(open_duration elapsed)──► HalfOpen
//!   ▲                                  ▲                                  │
//!   └──────────(trial succeeds)────────┼──────────────────────────────────┤
//!                                      └──────────(trial fails)───────────┘
//! ```
//!
//! Besides the lazy check on the next call, tripping the breaker schedules a
//! timer (`half_open_after`) that moves it to half-open even if no traffic
//! arrives. Only one trial is admitted while half-open; concurrent callers
//! are rejected until the trial resolves.
//!
//! Breakers must come from a shared [`CircuitRegistry`] so that failures
//! accumulate across calls.

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state for metrics/monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::HalfOpen => write!(f, "half_open"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Error type for circuit-protected operations
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit breaker rejected the call (circuit is open)
    #[error("circuit breaker open, request rejected")]
    Rejected,

    /// The underlying operation failed
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitConfig {
    /// Number of consecutive failures to trip the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before admitting a trial
    #[serde(
        rename = "open_duration_ms",
        default = "default_open_duration",
        with = "crate::config::serde_millis"
    )]
    pub open_duration: Duration,
    /// Timer that forces open → half-open when no call arrives to do it
    #[serde(
        rename = "half_open_after_ms",
        default = "default_half_open_after",
        with = "crate::config::serde_millis"
    )]
    pub half_open_after: Duration,
}

fn default_failure_threshold() -> u32 { 5 }
fn default_open_duration() -> Duration { Duration::from_secs(60) }
fn default_half_open_after() -> Duration { Duration::from_secs(30) }

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_duration: default_open_duration(),
            half_open_after: default_half_open_after(),
        }
    }
}

impl CircuitConfig {
    /// Aggressive config for critical paths (trips faster, recovers cautiously)
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            failure_threshold: 3,
            open_duration: Duration::from_secs(120),
            half_open_after: Duration::from_secs(60),
        }
    }

    /// Lenient config for less critical paths (tolerates more failures)
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            failure_threshold: 10,
            open_duration: Duration::from_secs(15),
            half_open_after: Duration::from_secs(10),
        }
    }

    /// Fast recovery for testing
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            failure_threshold: 2,
            open_duration: Duration::from_millis(50),
            half_open_after: Duration::from_millis(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    /// Bumped on every trip; a half-open timer only fires for its own trip
    generation: u64,
    trial_in_flight: bool,
}

enum Admission {
    Normal,
    Trial,
    Rejected,
}

/// Clears the half-open trial slot if the trial future is dropped mid-flight.
struct TrialGuard<'a> {
    state: Option<&'a Mutex<BreakerState>>,
}

impl TrialGuard<'_> {
    fn disarm(&mut self) {
        self.state = None;
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.state {
            state.lock().trial_in_flight = false;
        }
    }
}

/// A named circuit breaker with metrics tracking
pub struct CircuitBreaker {
    name: String,
    config: CircuitConfig,
    state: Arc<Mutex<BreakerState>>,

    // Metrics
    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and config
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                generation: 0,
                trial_in_flight: false,
            })),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Create with default config
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitConfig::default())
    }

    /// Get the circuit breaker name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    /// Current state, applying the lazy open → half-open transition.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let mut s = self.state.lock();
        self.refresh_open(&mut s);
        s.state
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    /// Execute an async operation through the circuit breaker
    ///
    /// Takes a closure that returns a Future, so nothing runs when the
    /// breaker rejects the call.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.calls_total.fetch_add(1, Ordering::Relaxed);

        let trial = match self.admit() {
            Admission::Rejected => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                warn!(circuit = %self.name, "Circuit breaker rejected call (open)");
                crate::metrics::record_circuit_breaker_call(&self.name, "rejected");
                return Err(CircuitError::Rejected);
            }
            Admission::Normal => false,
            Admission::Trial => true,
        };

        let mut guard = TrialGuard {
            state: trial.then_some(self.state.as_ref()),
        };
        let outcome = f().await;
        guard.disarm();

        match outcome {
            Ok(result) => {
                self.on_success(trial);
                self.successes.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, trial, "Circuit call succeeded");
                crate::metrics::record_circuit_breaker_call(&self.name, "success");
                Ok(result)
            }
            Err(e) => {
                self.on_failure(trial);
                self.failures.fetch_add(1, Ordering::Relaxed);
                debug!(circuit = %self.name, trial, "Circuit call failed");
                crate::metrics::record_circuit_breaker_call(&self.name, "failure");
                Err(CircuitError::Inner(e))
            }
        }
    }

    /// Force the breaker closed and clear the failure count.
    pub fn reset(&self) {
        let mut s = self.state.lock();
        s.state = CircuitState::Closed;
        s.consecutive_failures = 0;
        s.last_failure = None;
        s.trial_in_flight = false;
        s.generation += 1;
        crate::metrics::set_circuit_state(&self.name, CircuitState::Closed as u8);
        info!(circuit = %self.name, "Circuit breaker manually reset");
    }

    fn refresh_open(&self, s: &mut BreakerState) {
        if s.state != CircuitState::Open {
            return;
        }
        let elapsed = s.last_failure.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
        if elapsed >= self.config.open_duration {
            s.state = CircuitState::HalfOpen;
            s.trial_in_flight = false;
            info!(circuit = %self.name, "Circuit breaker half-open (open duration elapsed)");
            crate::metrics::set_circuit_state(&self.name, CircuitState::HalfOpen as u8);
        }
    }

    fn admit(&self) -> Admission {
        let mut s = self.state.lock();
        self.refresh_open(&mut s);
        match s.state {
            CircuitState::Closed => Admission::Normal,
            CircuitState::Open => Admission::Rejected,
            CircuitState::HalfOpen if s.trial_in_flight => Admission::Rejected,
            CircuitState::HalfOpen => {
                s.trial_in_flight = true;
                Admission::Trial
            }
        }
    }

    /// Only the half-open trial may close the breaker. A call admitted
    /// before the breaker tripped finishes as a straggler and leaves the
    /// state alone.
    fn on_success(&self, trial: bool) {
        let mut s = self.state.lock();
        match s.state {
            CircuitState::Closed => s.consecutive_failures = 0,
            CircuitState::HalfOpen if trial => {
                s.consecutive_failures = 0;
                s.trial_in_flight = false;
                s.state = CircuitState::Closed;
                info!(circuit = %self.name, "Circuit breaker closed (trial succeeded)");
                crate::metrics::set_circuit_state(&self.name, CircuitState::Closed as u8);
            }
            CircuitState::HalfOpen | CircuitState::Open => {
                debug!(circuit = %self.name, state = %s.state, "Ignoring late success");
            }
        }
    }

    fn on_failure(&self, trial: bool) {
        let tripped = {
            let mut s = self.state.lock();
            s.consecutive_failures = s.consecutive_failures.saturating_add(1);
            s.last_failure = Some(Instant::now());
            if trial {
                s.trial_in_flight = false;
            }

            let should_trip = match s.state {
                CircuitState::HalfOpen => trial,
                CircuitState::Closed => s.consecutive_failures >= self.config.failure_threshold,
                // Already open: the pending timer keeps its generation
                CircuitState::Open => false,
            };
            if should_trip {
                s.state = CircuitState::Open;
                s.generation += 1;
                warn!(
                    circuit = %self.name,
                    failures = s.consecutive_failures,
                    "Circuit breaker opened"
                );
                crate::metrics::set_circuit_state(&self.name, CircuitState::Open as u8);
                Some(s.generation)
            } else {
                None
            }
        };

        if let Some(generation) = tripped {
            self.schedule_half_open(generation);
        }
    }

    fn schedule_half_open(&self, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = Arc::clone(&self.state);
        let name = self.name.clone();
        let delay = self.config.half_open_after;

        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut s = state.lock();
            if s.state == CircuitState::Open && s.generation == generation {
                s.state = CircuitState::HalfOpen;
                s.trial_in_flight = false;
                debug!(circuit = %name, "Circuit breaker half-open (timer)");
                crate::metrics::set_circuit_state(&name, CircuitState::HalfOpen as u8);
            }
        });
    }

    /// Get total number of calls
    #[must_use]
    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    /// Get number of successful calls
    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Get number of failed calls (operation errors)
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Get number of rejected calls (circuit open)
    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Get failure rate (0.0 - 1.0)
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let total = self.calls_total();
        if total == 0 {
            return 0.0;
        }
        self.failures() as f64 / total as f64
    }
}

/// Point-in-time view of one registered breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub provider: String,
    pub operation: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub calls: u64,
    pub rejections: u64,
}

/// Shared breaker registry keyed by (provider, operation).
///
/// Handed to providers at construction; a fresh registry per test keeps
/// failure counts isolated.
pub struct CircuitRegistry {
    config: CircuitConfig,
    breakers: DashMap<(String, String), Arc<CircuitBreaker>>,
}

impl Default for CircuitRegistry {
    fn default() -> Self {
        Self::new(CircuitConfig::default())
    }
}

impl CircuitRegistry {
    pub fn new(config: CircuitConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Get the breaker for a pair, creating it on first use.
    pub fn breaker(&self, provider: &str, operation: &str) -> Arc<CircuitBreaker> {
        let key = (provider.to_string(), operation.to_string());
        self.breakers
            .entry(key)
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    format!("{}.{}", provider, operation),
                    self.config.clone(),
                ))
            })
            .clone()
    }

    /// Look up an existing breaker without creating one.
    #[must_use]
    pub fn get(&self, provider: &str, operation: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .get(&(provider.to_string(), operation.to_string()))
            .map(|b| b.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }

    /// Snapshot every breaker, sorted by provider then operation.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let mut out: Vec<CircuitSnapshot> = self
            .breakers
            .iter()
            .map(|entry| {
                let (provider, operation) = entry.key();
                let breaker = entry.value();
                CircuitSnapshot {
                    provider: provider.clone(),
                    operation: operation.clone(),
                    state: breaker.state(),
                    consecutive_failures: breaker.consecutive_failures(),
                    calls: breaker.calls_total(),
                    rejections: breaker.rejections(),
                }
            })
            .collect();
        out.sort_by(|a, b| (&a.provider, &a.operation).cmp(&(&b.provider, &b.operation)));
        out
    }

    /// Reset every registered breaker to closed.
    pub fn reset_all(&self) {
        for entry in self.breakers.iter() {
            entry.value().reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    async fn fail(cb: &CircuitBreaker) {
        let _: Result<i32, CircuitError<&str>> = cb.call(|| async { Err("fail") }).await;
    }

    #[tokio::test]
    async fn test_circuit_passes_successful_calls() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());

        let result: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(42) }).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(cb.successes(), 1);
        assert_eq!(cb.failures(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_circuit_tracks_failures() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());

        let result: Result<i32, CircuitError<&str>> = cb.call(|| async { Err("boom") }).await;

        assert!(matches!(result, Err(CircuitError::Inner("boom"))));
        assert_eq!(cb.failures(), 1);
        assert_eq!(cb.consecutive_failures(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_open_circuit_does_not_invoke_operation() {
        let config = CircuitConfig {
            failure_threshold: 3,
            open_duration: Duration::from_secs(60),
            half_open_after: Duration::from_secs(30),
        };
        let cb = CircuitBreaker::new("test", config);

        for _ in 0..3 {
            fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let invoked = AtomicUsize::new(0);
        let result: Result<i32, CircuitError<&str>> = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            })
            .await;

        assert!(matches!(result, Err(CircuitError::Rejected)));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(cb.rejections(), 1);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_count() {
        let config = CircuitConfig {
            failure_threshold: 3,
            ..CircuitConfig::test()
        };
        let cb = CircuitBreaker::new("test", config);

        fail(&cb).await;
        fail(&cb).await;
        let _: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(1) }).await;
        fail(&cb).await;
        fail(&cb).await;

        // Never three in a row
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 2);
    }

    #[tokio::test]
    async fn test_half_open_after_open_duration() {
        let config = CircuitConfig {
            failure_threshold: 2,
            open_duration: Duration::from_millis(40),
            half_open_after: Duration::from_secs(30),
        };
        let cb = CircuitBreaker::new("test", config);
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;

        let invoked = AtomicUsize::new(0);
        let result: Result<i32, CircuitError<&str>> = cb
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_timer_moves_open_to_half_open_without_traffic() {
        let config = CircuitConfig {
            failure_threshold: 1,
            open_duration: Duration::from_secs(60),
            half_open_after: Duration::from_millis(20),
        };
        let cb = CircuitBreaker::new("test", config);
        fail(&cb).await;

        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());
        fail(&cb).await;
        fail(&cb).await;

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 3);
    }

    #[tokio::test]
    async fn test_dropped_trial_call_frees_slot() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());
        fail(&cb).await;
        fail(&cb).await;
        tokio::time::sleep(Duration::from_millis(70)).await;

        // Start a trial and abandon it mid-flight
        {
            let trial = cb.call(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<_, &str>(1)
            });
            let _ = tokio::time::timeout(Duration::from_millis(5), trial).await;
        }

        let result: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(2) }).await;
        assert_eq!(result.unwrap(), 2);
    }

    /// Start a call that stays in flight until the returned sender fires.
    async fn hold_call(
        cb: &Arc<CircuitBreaker>,
        outcome: Result<i32, &'static str>,
    ) -> (oneshot::Sender<()>, JoinHandle<Result<i32, CircuitError<&'static str>>>) {
        let (release, gate) = oneshot::channel::<()>();
        let before = cb.calls_total();
        let task = {
            let cb = Arc::clone(cb);
            tokio::spawn(async move {
                cb.call(|| async move {
                    let _ = gate.await;
                    outcome
                })
                .await
            })
        };
        while cb.calls_total() == before {
            tokio::task::yield_now().await;
        }
        (release, task)
    }

    #[tokio::test]
    async fn test_late_success_leaves_open_breaker_open() {
        let config = CircuitConfig {
            failure_threshold: 2,
            open_duration: Duration::from_secs(60),
            half_open_after: Duration::from_secs(30),
        };
        let cb = Arc::new(CircuitBreaker::new("test", config));

        // Admitted while closed, finishes after the trip
        let (release, slow) = hold_call(&cb, Ok(1)).await;
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        release.send(()).unwrap();
        assert_eq!(slow.await.unwrap().unwrap(), 1);

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 2);
        let rejected: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(2) }).await;
        assert!(matches!(rejected, Err(CircuitError::Rejected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_straggler_does_not_settle_half_open() {
        let config = CircuitConfig {
            failure_threshold: 2,
            open_duration: Duration::from_secs(60),
            half_open_after: Duration::from_secs(30),
        };
        let cb = Arc::new(CircuitBreaker::new("test", config));

        let (release_straggler, straggler) = hold_call(&cb, Ok(1)).await;
        fail(&cb).await;
        fail(&cb).await;
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let (release_trial, trial) = hold_call(&cb, Ok(3)).await;

        // The straggler finishing neither closes the breaker nor frees the slot
        release_straggler.send(()).unwrap();
        assert!(straggler.await.unwrap().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        let rejected: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(4) }).await;
        assert!(matches!(rejected, Err(CircuitError::Rejected)));

        release_trial.send(()).unwrap();
        assert_eq!(trial.await.unwrap().unwrap(), 3);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_reset_closes_breaker() {
        let cb = CircuitBreaker::new("test", CircuitConfig::test());
        fail(&cb).await;
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_failure_rate_calculation() {
        let config = CircuitConfig {
            failure_threshold: 100,
            ..CircuitConfig::test()
        };
        let cb = CircuitBreaker::new("test", config);

        let _: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(1) }).await;
        let _: Result<i32, CircuitError<&str>> = cb.call(|| async { Err("x") }).await;
        let _: Result<i32, CircuitError<&str>> = cb.call(|| async { Ok(2) }).await;
        let _: Result<i32, CircuitError<&str>> = cb.call(|| async { Err("y") }).await;

        assert!((cb.failure_rate() - 0.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_registry_returns_shared_instance() {
        let registry = CircuitRegistry::new(CircuitConfig::test());

        let a = registry.breaker("local", "get_record");
        let b = registry.breaker("local", "get_record");
        let other = registry.breaker("local", "query_records");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &other));
        assert_eq!(a.name(), "local.get_record");
        assert_eq!(registry.len(), 2);

        // Failures through one handle are visible through the other
        fail(&a).await;
        assert_eq!(b.consecutive_failures(), 1);
    }

    #[tokio::test]
    async fn test_registry_snapshot_sorted() {
        let registry = CircuitRegistry::new(CircuitConfig::test());
        registry.breaker("local", "query_records");
        let get = registry.breaker("local", "get_record");
        fail(&get).await;
        fail(&get).await;

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].operation, "get_record");
        assert_eq!(snapshot[0].state, CircuitState::Open);
        assert_eq!(snapshot[1].state, CircuitState::Closed);

        registry.reset_all();
        assert!(registry.snapshot().iter().all(|s| s.state == CircuitState::Closed));
    }

    #[test]
    fn test_circuit_config_presets() {
        let default = CircuitConfig::default();
        let aggressive = CircuitConfig::aggressive();
        let lenient = CircuitConfig::lenient();

        assert!(aggressive.failure_threshold < default.failure_threshold);
        assert!(lenient.failure_threshold > default.failure_threshold);
        assert!(aggressive.open_duration > lenient.open_duration);
        assert!(default.half_open_after < default.open_duration);
    }
}
