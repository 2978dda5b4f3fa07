//! The error surface of the gateway.
//!
//! Every failure a caller can observe is a `GatewayError`; transport and
//! parsing details stay in the logs.

use std::time::Duration;

use thiserror::Error;

use crate::security::LockedOut;
use crate::token::{BearerError, InvalidReason, TokenError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("authentication credentials were not provided")]
    MissingToken,

    #[error("invalid token ({reason})")]
    InvalidToken { reason: InvalidReason },

    #[error("token signing keys are temporarily unavailable")]
    KeyUnavailable,

    #[error(
        "too many failed login attempts, try again in {} seconds",
        retry_after_secs(.retry_after)
    )]
    LockedOut { retry_after: Duration },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("identity provider unavailable")]
    IdpUnavailable,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("missing required permission '{permission}'")]
    Forbidden { permission: String },

    #[error("rate limit exceeded, try again in {} seconds", retry_after_secs(.retry_after))]
    RateLimited { retry_after: Duration },

    #[error("operation did not complete before its deadline")]
    DeadlineExceeded,
}

impl GatewayError {
    /// Stable machine-readable category.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::MissingToken => "missing_token",
            GatewayError::InvalidToken { .. } => "invalid_token",
            GatewayError::KeyUnavailable => "key_unavailable",
            GatewayError::LockedOut { .. } => "locked_out",
            GatewayError::InvalidCredentials => "invalid_credentials",
            GatewayError::IdpUnavailable => "idp_unavailable",
            GatewayError::InvalidRequest(_) => "invalid_request",
            GatewayError::Forbidden { .. } => "forbidden",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::DeadlineExceeded => "deadline_exceeded",
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::LockedOut { retry_after } | GatewayError::RateLimited { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }
}

/// Whole seconds, rounded up so clients never retry early.
pub fn retry_after_secs(retry_after: &Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl From<TokenError> for GatewayError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid { reason } => GatewayError::InvalidToken { reason },
            TokenError::KeyUnavailable(_) => GatewayError::KeyUnavailable,
        }
    }
}

impl From<BearerError> for GatewayError {
    fn from(e: BearerError) -> Self {
        match e {
            BearerError::Missing => GatewayError::MissingToken,
            BearerError::Invalid(e) => e.into(),
        }
    }
}

impl From<LockedOut> for GatewayError {
    fn from(e: LockedOut) -> Self {
        GatewayError::LockedOut {
            retry_after: e.retry_after,
        }
    }
}
