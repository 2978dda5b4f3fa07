//! Retry classification.
//!
//! # Responsibilities
//! - Decide whether a failed IdP attempt is worth retrying
//! - Decide whether it says anything about IdP health (breaker input)
//!
//! # Design Decisions
//! - Connection errors, timeouts and 5xx are transient and unhealthy
//! - 429 is transient but healthy: the IdP is up and pacing us
//! - Any other 4xx is the caller's fault; never retried, never counted

/// How a failed attempt should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retry with backoff. `unhealthy` attempts count against the breaker.
    Transient { unhealthy: bool },
    /// Surface immediately.
    Permanent,
}

impl FailureClass {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureClass::Transient { .. })
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, FailureClass::Transient { unhealthy: true })
    }
}

/// Classify an HTTP status. `None` means the status is a success.
pub fn classify_status(status: u16) -> Option<FailureClass> {
    match status {
        200..=399 => None,
        429 => Some(FailureClass::Transient { unhealthy: false }),
        500..=599 => Some(FailureClass::Transient { unhealthy: true }),
        _ => Some(FailureClass::Permanent),
    }
}

/// Transport-level failures (no response at all) are always transient.
pub fn classify_transport_failure() -> FailureClass {
    FailureClass::Transient { unhealthy: true }
}
