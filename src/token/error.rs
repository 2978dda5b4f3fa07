//! Token and key errors.

use thiserror::Error;

/// Key lookup failure. Clone so a single refresh result can be shared by
/// every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("no key with id '{0}' in the published key set")]
    NotFound(String),

    #[error("key set unavailable: {0}")]
    Fetch(String),
}

/// Why a token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    Malformed,
    DisallowedAlgorithm,
    UnknownKey,
    BadSignature,
    Expired,
    BadClaims,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::Malformed => "malformed",
            InvalidReason::DisallowedAlgorithm => "disallowed_algorithm",
            InvalidReason::UnknownKey => "unknown_key",
            InvalidReason::BadSignature => "bad_signature",
            InvalidReason::Expired => "expired",
            InvalidReason::BadClaims => "bad_claims",
        }
    }
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("invalid token: {reason}")]
    Invalid { reason: InvalidReason },

    /// The token could not be checked because no key set is available.
    #[error("signing keys unavailable: {0}")]
    KeyUnavailable(String),
}

impl TokenError {
    pub fn invalid(reason: InvalidReason) -> Self {
        TokenError::Invalid { reason }
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            TokenError::Invalid { reason } => Some(*reason),
            TokenError::KeyUnavailable(_) => None,
        }
    }
}
