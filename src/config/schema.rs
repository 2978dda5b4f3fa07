//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.
//! Every threshold the gateway acts on lives here; nothing is hard-coded
//! in the subsystems themselves.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the IdP gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Identity provider endpoints and client credentials.
    pub idp: IdpConfig,

    /// Circuit breaker guarding outbound IdP calls.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry and backoff configuration for outbound IdP calls.
    pub retries: RetryConfig,

    /// Public key set caching.
    pub jwks: JwksConfig,

    /// Inbound token validation rules.
    pub token: TokenConfig,

    /// Login brute-force protection.
    pub login_guard: LoginGuardConfig,

    /// Per-source request throttling on the auth endpoints.
    pub rate_limit: RateLimitConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Whole-request timeout for inbound requests in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Identity provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdpConfig {
    /// Token endpoint (POST).
    pub token_url: String,

    /// Key-set (JWKS) endpoint (GET).
    pub jwks_url: String,

    /// Optional health endpoint. The key-set endpoint is probed when unset.
    pub health_url: Option<String>,

    /// OAuth client ID presented on token requests.
    pub client_id: String,

    /// OAuth client secret. Overridden by `IDP_CLIENT_SECRET` when set.
    pub client_secret: String,

    /// Audience requested on token requests.
    pub audience: String,

    /// Grant type used for credential logins.
    pub grant_type: String,

    /// Optional scope requested on token requests.
    pub scope: Option<String>,

    /// Optional realm / connection name for realm-aware password grants.
    pub realm: Option<String>,

    /// Per-attempt timeout for outbound calls in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for IdpConfig {
    fn default() -> Self {
        Self {
            token_url: "https://idp.example.com/oauth/token".to_string(),
            jwks_url: "https://idp.example.com/.well-known/jwks.json".to_string(),
            health_url: None,
            client_id: String::new(),
            client_secret: String::new(),
            audience: "https://api.example.com".to_string(),
            grant_type: "password".to_string(),
            scope: Some("openid offline_access".to_string()),
            realm: None,
            request_timeout_ms: 5000,
        }
    }
}

impl IdpConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive downstream failures before the circuit opens.
    pub fail_max: u32,

    /// Seconds the circuit stays open before a half-open trial is allowed.
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            fail_max: 3,
            reset_timeout_secs: 30,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_secs(self.reset_timeout_secs)
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per outbound call (1 disables retries).
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Growth factor applied per attempt.
    pub multiplier: f64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Randomization applied to each delay, as a fraction (0.1 = ±10%).
    pub jitter_fraction: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            jitter_fraction: 0.1,
        }
    }
}

/// Key-set cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwksConfig {
    /// Seconds a fetched key set is considered fresh.
    pub ttl_secs: u64,

    /// Minimum seconds between refreshes triggered by an unknown key ID
    /// while the current set is still fresh. 0 refreshes on every miss.
    pub min_refresh_interval_secs: u64,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            min_refresh_interval_secs: 0,
        }
    }
}

impl JwksConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.min_refresh_interval_secs)
    }
}

/// Inbound token validation configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Required `iss` claim.
    pub expected_issuer: String,

    /// Audience that must appear in the `aud` claim.
    pub expected_audience: String,

    /// The only signing algorithm accepted (e.g., "RS256").
    pub pinned_algorithm: String,

    /// Clock skew tolerated on `exp` / `nbf` in seconds.
    pub leeway_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            expected_issuer: "https://idp.example.com/".to_string(),
            expected_audience: "https://api.example.com".to_string(),
            pinned_algorithm: "RS256".to_string(),
            leeway_secs: 0,
        }
    }
}

/// Login attempt guard configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoginGuardConfig {
    /// Failed attempts within the window that trigger a lockout.
    pub threshold: u32,

    /// Sliding window length in seconds.
    pub window_secs: u64,

    /// Lockout duration in seconds.
    pub lockout_secs: u64,

    /// Interval between sweeps of idle attempt records in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for LoginGuardConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            window_secs: 300,
            lockout_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

/// Per-source request throttling on login and refresh.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable throttling.
    pub enabled: bool,

    /// Requests allowed per window per source address.
    pub max_requests: u32,

    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 5,
            window_secs: 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [circuit_breaker]
            fail_max = 5

            [token]
            expected_issuer = "https://tenant.auth.example/"
            "#,
        )
        .unwrap();

        assert_eq!(config.circuit_breaker.fail_max, 5);
        assert_eq!(config.circuit_breaker.reset_timeout_secs, 30);
        assert_eq!(config.token.expected_issuer, "https://tenant.auth.example/");
        assert_eq!(config.token.pinned_algorithm, "RS256");
        assert_eq!(config.login_guard.threshold, 5);
    }

    #[test]
    fn test_duration_helpers() {
        let config = GatewayConfig::default();
        assert_eq!(config.idp.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.jwks.ttl(), Duration::from_secs(3600));
        assert_eq!(config.circuit_breaker.reset_timeout(), Duration::from_secs(30));
    }
}
