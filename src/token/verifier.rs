//! Bearer token verification.
//!
//! # Verification Order
//! ```text
//! header (untrusted) → pinned alg → key by kid → signature → exp → iss/aud/nbf
//! ```
//!
//! # Design Decisions
//! - The header's `alg` is never trusted; anything but the pinned algorithm is refused
//! - jsonwebtoken checks the signature only; registered claims are checked here
//!   against an explicit `now` so expiry is testable
//! - A key set that cannot be fetched is not the token's fault (`KeyUnavailable`)

use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use thiserror::Error;

use crate::config::validation::is_rsa;
use crate::config::TokenConfig;
use crate::observability::metrics;
use crate::token::cache::KeySetCache;
use crate::token::claims::{RawClaims, TokenClaims};
use crate::token::{InvalidReason, KeyError, TokenError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported pinned algorithm '{0}'")]
pub struct UnsupportedAlgorithm(pub String);

pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    issuer: String,
    audience: String,
    algorithm: Algorithm,
    leeway_secs: u64,
}

impl TokenVerifier {
    pub fn new(
        keys: Arc<KeySetCache>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        algorithm: Algorithm,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            algorithm,
            leeway_secs: 0,
        }
    }

    pub fn from_config(
        keys: Arc<KeySetCache>,
        config: &TokenConfig,
    ) -> Result<Self, UnsupportedAlgorithm> {
        let algorithm = Algorithm::from_str(&config.pinned_algorithm)
            .ok()
            .filter(|alg| is_rsa(*alg))
            .ok_or_else(|| UnsupportedAlgorithm(config.pinned_algorithm.clone()))?;

        Ok(Self::new(keys, &config.expected_issuer, &config.expected_audience, algorithm)
            .with_leeway(config.leeway_secs))
    }

    /// Clock skew tolerated on `exp` and `nbf`.
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    pub fn keys(&self) -> &KeySetCache {
        &self.keys
    }

    pub async fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, now_epoch()).await
    }

    /// Verify as of `now` (seconds since the epoch).
    pub async fn verify_at(&self, token: &str, now: u64) -> Result<TokenClaims, TokenError> {
        let result = self.check(token, now).await;
        match &result {
            Ok(claims) => {
                metrics::record_token_verification("valid");
                tracing::debug!(sub = %claims.subject, "Token verified");
            }
            Err(TokenError::Invalid { reason }) => {
                metrics::record_token_verification(reason.as_str());
                tracing::debug!(reason = %reason, "Token rejected");
            }
            Err(TokenError::KeyUnavailable(e)) => {
                metrics::record_token_verification("key_unavailable");
                tracing::warn!(error = %e, "Token not verifiable, key set unavailable");
            }
        }
        result
    }

    async fn check(&self, token: &str, now: u64) -> Result<TokenClaims, TokenError> {
        use InvalidReason::*;

        let header = decode_header(token).map_err(|_| TokenError::invalid(Malformed))?;
        if header.alg != self.algorithm {
            return Err(TokenError::invalid(DisallowedAlgorithm));
        }
        let kid = header.kid.ok_or(TokenError::invalid(UnknownKey))?;

        let key = self.keys.get_key(&kid).await.map_err(|e| match e {
            KeyError::NotFound(_) => TokenError::invalid(UnknownKey),
            KeyError::Fetch(reason) => TokenError::KeyUnavailable(reason),
        })?;
        if key.algorithm.is_some_and(|alg| alg != self.algorithm) {
            return Err(TokenError::invalid(DisallowedAlgorithm));
        }

        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let raw = decode::<RawClaims>(token, key.decoding_key(), &validation)
            .map_err(|e| {
                TokenError::invalid(match e.kind() {
                    ErrorKind::InvalidSignature => BadSignature,
                    ErrorKind::InvalidAlgorithm => DisallowedAlgorithm,
                    ErrorKind::Json(_) => BadClaims,
                    _ => Malformed,
                })
            })?
            .claims;

        let leeway = self.leeway_secs;
        let expires_at = raw.exp.ok_or(TokenError::invalid(BadClaims))?;
        if expires_at.saturating_add(leeway) <= now {
            return Err(TokenError::invalid(Expired));
        }
        if raw.iss.as_deref() != Some(self.issuer.as_str()) {
            return Err(TokenError::invalid(BadClaims));
        }
        let permissions = raw.permission_set();
        let audience = raw.aud.map(|aud| aud.into_vec()).unwrap_or_default();
        if !audience.iter().any(|aud| *aud == self.audience) {
            return Err(TokenError::invalid(BadClaims));
        }
        if raw.nbf.is_some_and(|nbf| nbf > now.saturating_add(leeway)) {
            return Err(TokenError::invalid(BadClaims));
        }

        let subject = raw.sub.filter(|s| !s.is_empty()).ok_or(TokenError::invalid(BadClaims))?;
        let issued_at = raw.iat.ok_or(TokenError::invalid(BadClaims))?;

        Ok(TokenClaims {
            subject,
            audience,
            issuer: self.issuer.clone(),
            issued_at,
            expires_at,
            not_before: raw.nbf,
            permissions,
            custom: raw.extra,
        })
    }
}

fn now_epoch() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
