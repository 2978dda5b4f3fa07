//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, jitter within bounds)
//! - Validate IdP URLs and the pinned signing algorithm
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;

use jsonwebtoken::Algorithm;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a configuration, collecting every error found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }

    check_url(&mut errors, "idp.token_url", &config.idp.token_url);
    check_url(&mut errors, "idp.jwks_url", &config.idp.jwks_url);
    if let Some(health_url) = &config.idp.health_url {
        check_url(&mut errors, "idp.health_url", health_url);
    }
    if config.idp.request_timeout_ms == 0 {
        errors.push(ValidationError::new("idp.request_timeout_ms", "must be > 0"));
    }
    if config.idp.grant_type.trim().is_empty() {
        errors.push(ValidationError::new("idp.grant_type", "must not be empty"));
    }

    if config.circuit_breaker.fail_max == 0 {
        errors.push(ValidationError::new("circuit_breaker.fail_max", "must be > 0"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be > 0"));
    }
    if !retries.multiplier.is_finite() || retries.multiplier < 1.0 {
        errors.push(ValidationError::new("retries.multiplier", "must be >= 1.0"));
    }
    if !(0.0..1.0).contains(&retries.jitter_fraction) {
        errors.push(ValidationError::new(
            "retries.jitter_fraction",
            "must be within [0.0, 1.0)",
        ));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    if config.jwks.ttl_secs == 0 {
        errors.push(ValidationError::new("jwks.ttl_secs", "must be > 0"));
    }

    if config.token.expected_issuer.trim().is_empty() {
        errors.push(ValidationError::new("token.expected_issuer", "must not be empty"));
    }
    if config.token.expected_audience.trim().is_empty() {
        errors.push(ValidationError::new("token.expected_audience", "must not be empty"));
    }
    match Algorithm::from_str(&config.token.pinned_algorithm) {
        Ok(alg) if is_rsa(alg) => {}
        Ok(_) => errors.push(ValidationError::new(
            "token.pinned_algorithm",
            "only RSA algorithms can be verified against the published key set",
        )),
        Err(_) => errors.push(ValidationError::new(
            "token.pinned_algorithm",
            format!("unknown algorithm '{}'", config.token.pinned_algorithm),
        )),
    }

    let guard = &config.login_guard;
    if guard.threshold == 0 {
        errors.push(ValidationError::new("login_guard.threshold", "must be > 0"));
    }
    if guard.window_secs == 0 {
        errors.push(ValidationError::new("login_guard.window_secs", "must be > 0"));
    }
    if guard.lockout_secs == 0 {
        errors.push(ValidationError::new("login_guard.lockout_secs", "must be > 0"));
    }
    if guard.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("login_guard.sweep_interval_secs", "must be > 0"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.max_requests == 0 {
            errors.push(ValidationError::new("rate_limit.max_requests", "must be > 0"));
        }
        if config.rate_limit.window_secs == 0 {
            errors.push(ValidationError::new("rate_limit.window_secs", "must be > 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Algorithms that can be checked against an RSA modulus/exponent pair.
pub fn is_rsa(alg: Algorithm) -> bool {
    matches!(
        alg,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
    )
}

fn check_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("unsupported scheme '{}'", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.circuit_breaker.fail_max = 0;
        config.retries.jitter_fraction = 1.5;
        config.idp.jwks_url = "ftp://keys".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["idp.jwks_url", "circuit_breaker.fail_max", "retries.jitter_fraction"]
        );
    }

    #[test]
    fn test_rejects_non_rsa_pinned_algorithm() {
        let mut config = GatewayConfig::default();
        config.token.pinned_algorithm = "HS256".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "token.pinned_algorithm");

        config.token.pinned_algorithm = "none".to_string();
        assert!(validate_config(&config).is_err());
    }
}
