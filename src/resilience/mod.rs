//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound IdP call:
//!     → circuit_breaker.rs (reject fast if open, single trial if half-open)
//!     → timeouts.rs (per-attempt deadline)
//!     → On failure: retries.rs (retryable? unhealthy?)
//!     → backoff.rs (delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only downstream-health failures feed the breaker
//! - Growth lives in the backoff policy, never in the breaker's reset timeout

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{
    BreakerError, BreakerSnapshot, CircuitBreaker, CircuitOpenError, CircuitState,
};
pub use retries::FailureClass;
pub use timeouts::{with_timeout, TimedOut};
