//! Circuit breaker for IdP protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: IdP assumed down, requests fail fast
//! - Half-Open: testing if IdP recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= fail_max
//! Open → Half-Open: first call after reset_timeout
//! Half-Open → Closed: trial call succeeds
//! Half-Open → Open: trial call fails (opened_at reset, same reset_timeout)
//! ```
//!
//! # Design Decisions
//! - One breaker per logical downstream, owned by its client (not global)
//! - Fail fast in Open state (no waiting for timeout)
//! - Single trial in Half-Open; concurrent callers are rejected, not queued
//! - The caller classifies errors: only downstream-health failures count
//! - A call dropped mid-flight counts as a failure

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open { opened_at: Instant },
    HalfOpen { trial_in_flight: bool },
}

impl CircuitState {
    pub fn name(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open { .. } => "open",
            CircuitState::HalfOpen { .. } => "half_open",
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

/// Returned when a call is rejected without reaching the downstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{circuit}' is open")]
pub struct CircuitOpenError {
    pub circuit: String,
}

/// Outcome of a guarded call that did not succeed.
#[derive(Debug)]
pub enum BreakerError<E> {
    /// The breaker rejected the call; the downstream was not contacted.
    Open(CircuitOpenError),
    /// The call ran and returned this error.
    Inner(E),
}

impl<E: fmt::Display> fmt::Display for BreakerError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open(e) => write!(f, "{}", e),
            BreakerError::Inner(e) => write!(f, "{}", e),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BreakerError::Open(e) => Some(e),
            BreakerError::Inner(e) => Some(e),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
}

/// Failure-isolating wrapper around a single downstream.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    fail_max: u32,
    reset_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, fail_max: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            fail_max: fail_max.max(1),
            reset_timeout,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
            }),
        }
    }

    pub fn from_config(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self::new(name, config.fail_max, config.reset_timeout())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
        }
    }

    /// Run `f` through the breaker.
    ///
    /// `is_failure` decides whether an error reflects downstream health.
    /// Errors it rejects leave the failure count untouched; a Half-Open trial
    /// that ends this way frees the trial slot without closing the circuit.
    pub async fn call<T, E, F, Fut, C>(
        &self,
        f: F,
        is_failure: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let permit = self.acquire().map_err(BreakerError::Open)?;

        let result = f().await;
        match &result {
            Ok(_) => permit.succeed(),
            Err(e) if is_failure(e) => permit.fail(),
            Err(_) => permit.release(),
        }

        result.map_err(BreakerError::Inner)
    }

    fn acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open { opened_at } if opened_at.elapsed() >= self.reset_timeout => {
                inner.state = CircuitState::HalfOpen {
                    trial_in_flight: true,
                };
                drop(inner);
                self.transitioned(CircuitState::HalfOpen {
                    trial_in_flight: true,
                });
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen {
                trial_in_flight: false,
            } => {
                inner.state = CircuitState::HalfOpen {
                    trial_in_flight: true,
                };
                Ok(Permit::new(self, true))
            }
            CircuitState::Open { .. } | CircuitState::HalfOpen { .. } => {
                tracing::debug!(circuit = %self.name, "Call rejected, circuit open");
                Err(CircuitOpenError {
                    circuit: self.name.clone(),
                })
            }
        }
    }

    fn on_success(&self, trial: bool) {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::HalfOpen { .. } if trial => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                drop(inner);
                self.transitioned(CircuitState::Closed);
            }
            CircuitState::Closed => inner.consecutive_failures = 0,
            // Late completion of a call admitted before the circuit opened.
            _ => {}
        }
    }

    fn on_neutral(&self, trial: bool) {
        let mut inner = self.lock();
        if trial && matches!(inner.state, CircuitState::HalfOpen { .. }) {
            inner.state = CircuitState::HalfOpen {
                trial_in_flight: false,
            };
        }
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        let opened = match inner.state {
            CircuitState::HalfOpen { .. } if trial => true,
            CircuitState::Closed => inner.consecutive_failures >= self.fail_max,
            _ => false,
        };

        if opened {
            let state = CircuitState::Open {
                opened_at: Instant::now(),
            };
            inner.state = state;
            let failures = inner.consecutive_failures;
            drop(inner);
            tracing::warn!(
                circuit = %self.name,
                consecutive_failures = failures,
                reset_timeout = ?self.reset_timeout,
                "Circuit opened"
            );
            self.transitioned(state);
        }
    }

    fn transitioned(&self, state: CircuitState) {
        if !matches!(state, CircuitState::Open { .. }) {
            tracing::info!(circuit = %self.name, state = state.name(), "Circuit state changed");
        }
        metrics::record_circuit_transition(&self.name, state.name());
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Admission for one call. Dropping it unsettled records a failure, so a
/// cancelled trial can never leave the breaker stuck in Half-Open.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn succeed(mut self) {
        self.settled = true;
        self.breaker.on_success(self.trial);
    }

    fn fail(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }

    fn release(mut self) {
        self.settled = true;
        self.breaker.on_neutral(self.trial);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(
                circuit = %self.breaker.name,
                "Guarded call dropped before completion"
            );
            self.breaker.on_failure(self.trial);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Down,
        BadInput,
    }

    fn is_down(e: &TestError) -> bool {
        *e == TestError::Down
    }

    async fn fail(
        breaker: &CircuitBreaker,
        calls: &AtomicU32,
    ) -> Result<(), BreakerError<TestError>> {
        breaker
            .call(
                move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(TestError::Down)
                },
                is_down,
            )
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<TestError>> {
        breaker.call(|| async { Ok(7) }, is_down).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_fail_max_and_short_circuits() {
        let breaker = CircuitBreaker::new("idp", 3, Duration::from_secs(30));
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            assert!(matches!(fail(&breaker, &calls).await, Err(BreakerError::Inner(_))));
        }
        assert!(matches!(breaker.snapshot().state, CircuitState::Open { .. }));

        let result = fail(&breaker, &calls).await;
        assert!(matches!(result, Err(BreakerError::Open(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3, "no call while open");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_consecutive_failures() {
        let breaker = CircuitBreaker::new("idp", 3, Duration::from_secs(30));
        let calls = AtomicU32::new(0);

        let _ = fail(&breaker, &calls).await;
        let _ = fail(&breaker, &calls).await;
        assert_eq!(breaker.snapshot().consecutive_failures, 2);

        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_errors_do_not_trip() {
        let breaker = CircuitBreaker::new("idp", 1, Duration::from_secs(30));
        for _ in 0..5 {
            let result = breaker
                .call(|| async { Err::<(), _>(TestError::BadInput) }, is_down)
                .await;
            assert!(matches!(result, Err(BreakerError::Inner(TestError::BadInput))));
        }
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    async fn bad_input(breaker: &CircuitBreaker) -> Result<(), BreakerError<TestError>> {
        breaker
            .call(|| async { Err::<(), _>(TestError::BadInput) }, is_down)
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_errors_keep_failure_count() {
        let breaker = CircuitBreaker::new("idp", 3, Duration::from_secs(30));
        let calls = AtomicU32::new(0);

        let _ = fail(&breaker, &calls).await;
        let _ = fail(&breaker, &calls).await;
        assert!(matches!(bad_input(&breaker).await, Err(BreakerError::Inner(_))));
        assert_eq!(breaker.snapshot().consecutive_failures, 2);

        let _ = fail(&breaker, &calls).await;
        assert!(matches!(breaker.snapshot().state, CircuitState::Open { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_error_on_trial_frees_the_slot() {
        let breaker = CircuitBreaker::new("idp", 1, Duration::from_secs(10));
        let calls = AtomicU32::new(0);
        let _ = fail(&breaker, &calls).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(matches!(bad_input(&breaker).await, Err(BreakerError::Inner(_))));
        assert_eq!(
            breaker.snapshot().state,
            CircuitState::HalfOpen {
                trial_in_flight: false
            }
        );

        assert!(succeed(&breaker).await.is_ok());
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let breaker = CircuitBreaker::new("idp", 1, Duration::from_secs(10));
        let calls = AtomicU32::new(0);
        let _ = fail(&breaker, &calls).await;

        tokio::time::advance(Duration::from_secs(10)).await;

        let admitted = AtomicU32::new(0);
        let counter = &admitted;
        let attempts = (0..8).map(|_| {
            breaker.call(
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, TestError>(())
                },
                is_down,
            )
        });
        let results = join_all(attempts).await;

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(BreakerError::Open(_))))
                .count(),
            7
        );
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_timestamp() {
        let breaker = CircuitBreaker::new("idp", 1, Duration::from_secs(10));
        let calls = AtomicU32::new(0);
        let _ = fail(&breaker, &calls).await;
        let first_opened = match breaker.snapshot().state {
            CircuitState::Open { opened_at } => opened_at,
            other => panic!("expected open, got {other:?}"),
        };

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(matches!(fail(&breaker, &calls).await, Err(BreakerError::Inner(_))));

        match breaker.snapshot().state {
            CircuitState::Open { opened_at } => assert!(opened_at > first_opened),
            other => panic!("expected open, got {other:?}"),
        }

        // Same reset_timeout applies again; no growth on the breaker itself.
        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(matches!(fail(&breaker, &calls).await, Err(BreakerError::Open(_))));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(succeed(&breaker).await.is_ok());
        assert_eq!(breaker.snapshot().state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_trial_counts_as_failure() {
        let breaker = CircuitBreaker::new("idp", 1, Duration::from_secs(10));
        let calls = AtomicU32::new(0);
        let _ = fail(&breaker, &calls).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let trial = breaker.call(
            || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, TestError>(())
            },
            is_down,
        );
        let timed_out = tokio::time::timeout(Duration::from_secs(1), trial).await;
        assert!(timed_out.is_err());

        assert!(matches!(breaker.snapshot().state, CircuitState::Open { .. }));
    }
}
