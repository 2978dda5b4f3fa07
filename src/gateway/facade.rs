//! The gateway facade: login, authenticate, refresh.
//!
//! # Login Flow
//! ```text
//! guard.check ──locked──→ LockedOut
//!     │
//!     ▼
//! client.call(password grant)
//!     ├─ Ok                         → guard.record_success → TokenPair
//!     ├─ credential rejection (4xx) → guard.record_failure → InvalidCredentials
//!     └─ unreachable / circuit open → IdpUnavailable (not counted)
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::config::{GatewayConfig, IdpConfig};
use crate::gateway::types::{HealthReport, HealthStatus, IdpProbe, KeySetHealth, TokenPair};
use crate::gateway::GatewayError;
use crate::idp::{
    ClientBuildError, IdentityProviderClient, IdpError, IdpRequest, IdpResponse, TokenGrant,
};
use crate::observability::metrics;
use crate::resilience::{with_timeout, CircuitState};
use crate::security::{AttemptKey, LoginAttemptGuard};
use crate::token::{extract_bearer, KeySetCache, TokenClaims, TokenVerifier, UnsupportedAlgorithm};

#[derive(Debug, Error)]
pub enum GatewayBuildError {
    #[error(transparent)]
    Client(#[from] ClientBuildError),
    #[error(transparent)]
    Algorithm(#[from] UnsupportedAlgorithm),
}

pub struct AuthGateway {
    client: Arc<IdentityProviderClient>,
    verifier: TokenVerifier,
    guard: Arc<LoginAttemptGuard>,
    idp: IdpConfig,
}

impl AuthGateway {
    pub fn new(
        client: Arc<IdentityProviderClient>,
        verifier: TokenVerifier,
        guard: Arc<LoginAttemptGuard>,
        idp: IdpConfig,
    ) -> Self {
        Self {
            client,
            verifier,
            guard,
            idp,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayBuildError> {
        let client = Arc::new(IdentityProviderClient::from_config(config)?);
        let keys = Arc::new(KeySetCache::from_config(client.clone(), &config.jwks));
        let verifier = TokenVerifier::from_config(keys, &config.token)?;
        let guard = Arc::new(LoginAttemptGuard::from_config(&config.login_guard));
        Ok(Self::new(client, verifier, guard, config.idp.clone()))
    }

    pub fn guard(&self) -> &Arc<LoginAttemptGuard> {
        &self.guard
    }

    pub fn client(&self) -> &Arc<IdentityProviderClient> {
        &self.client
    }

    /// Exchange credentials for tokens. `source` is the caller's network
    /// origin and scopes the lockout.
    pub async fn login(
        &self,
        identity: &str,
        secret: &str,
        source: &str,
    ) -> Result<TokenPair, GatewayError> {
        if identity.trim().is_empty() || secret.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "identity and secret are required".to_string(),
            ));
        }

        let key = AttemptKey::new(identity, source);
        if let Err(locked) = self.guard.check(&key) {
            metrics::record_login("locked_out");
            tracing::info!(
                identity = %key.identity(),
                source = %source,
                "Login refused, locked out"
            );
            return Err(locked.into());
        }

        let request = IdpRequest::password_grant(&self.idp, identity.trim(), secret);
        let result = self.client.call(&request).await;

        match result {
            Ok(response) => {
                let pair = parse_grant(&response)?;
                self.guard.record_success(&key);
                metrics::record_login("success");
                tracing::info!(identity = %key.identity(), source = %source, "Login succeeded");
                Ok(pair)
            }
            Err(e) if is_credential_rejection(&e) => {
                self.guard.record_failure(&key);
                metrics::record_login("invalid_credentials");
                tracing::info!(
                    identity = %key.identity(),
                    source = %source,
                    "Login rejected by IdP"
                );
                Err(GatewayError::InvalidCredentials)
            }
            Err(e) => {
                metrics::record_login("idp_unavailable");
                Err(unavailable(&e))
            }
        }
    }

    /// Verify a raw bearer token.
    pub async fn authenticate(&self, token: &str) -> Result<TokenClaims, GatewayError> {
        Ok(self.verifier.verify(token).await?)
    }

    /// Verify the token carried by an `Authorization` header value.
    pub async fn authenticate_header(
        &self,
        header: Option<&str>,
    ) -> Result<TokenClaims, GatewayError> {
        let token = extract_bearer(header)?;
        self.authenticate(token).await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, GatewayError> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "refresh_token is required".to_string(),
            ));
        }

        let request = IdpRequest::refresh_grant(&self.idp, refresh_token);
        match self.client.call(&request).await {
            Ok(response) => parse_grant(&response),
            Err(e) if is_credential_rejection(&e) => {
                tracing::info!("Refresh token rejected by IdP");
                Err(GatewayError::InvalidCredentials)
            }
            Err(e) => Err(unavailable(&e)),
        }
    }

    pub async fn login_with_deadline(
        &self,
        identity: &str,
        secret: &str,
        source: &str,
        deadline: Duration,
    ) -> Result<TokenPair, GatewayError> {
        with_timeout(deadline, self.login(identity, secret, source))
            .await
            .unwrap_or(Err(GatewayError::DeadlineExceeded))
    }

    pub async fn authenticate_with_deadline(
        &self,
        token: &str,
        deadline: Duration,
    ) -> Result<TokenClaims, GatewayError> {
        with_timeout(deadline, self.authenticate(token))
            .await
            .unwrap_or(Err(GatewayError::DeadlineExceeded))
    }

    pub async fn refresh_with_deadline(
        &self,
        refresh_token: &str,
        deadline: Duration,
    ) -> Result<TokenPair, GatewayError> {
        with_timeout(deadline, self.refresh(refresh_token))
            .await
            .unwrap_or(Err(GatewayError::DeadlineExceeded))
    }

    pub fn require_permission(claims: &TokenClaims, permission: &str) -> Result<(), GatewayError> {
        if claims.has_permission(permission) {
            Ok(())
        } else {
            Err(GatewayError::Forbidden {
                permission: permission.to_string(),
            })
        }
    }

    /// Probe the IdP and report what the gateway can currently do.
    pub async fn health(&self) -> HealthReport {
        let idp = match self.client.call(&IdpRequest::health()).await {
            Ok(response) if !response.stale => IdpProbe {
                reachable: true,
                cached: false,
                detail: None,
            },
            Ok(response) => IdpProbe {
                reachable: false,
                cached: true,
                detail: Some(format!(
                    "circuit open, last successful probe {}s ago",
                    response.age().as_secs()
                )),
            },
            Err(e) => IdpProbe {
                reachable: false,
                cached: false,
                detail: Some(e.to_string()),
            },
        };

        let breaker = self.client.breaker();
        let key_set = self.verifier.keys().current().map(|set| KeySetHealth {
            keys: set.len(),
            age_secs: set.age().as_secs(),
            stale: set.is_stale(),
        });

        let status = if idp.reachable && breaker.state == CircuitState::Closed {
            HealthStatus::Healthy
        } else if idp.reachable || key_set.as_ref().is_some_and(|set| set.keys > 0) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };

        HealthReport {
            status,
            circuit: breaker.state.name().to_string(),
            consecutive_failures: breaker.consecutive_failures,
            key_set,
            idp,
        }
    }
}

/// 401/403 always mean bad credentials; a 400 only with `invalid_grant`.
fn is_credential_rejection(e: &IdpError) -> bool {
    match e {
        IdpError::Rejected { status: 401 | 403, .. } => true,
        IdpError::Rejected { status: 400, .. } => e
            .rejection()
            .is_some_and(|body| body.error == "invalid_grant"),
        _ => false,
    }
}

fn unavailable(e: &IdpError) -> GatewayError {
    match e {
        IdpError::Rejected { status, .. } => {
            let detail = e
                .rejection()
                .and_then(|body| body.error_description.or(Some(body.error)))
                .unwrap_or_else(|| format!("IdP returned status {status}"));
            tracing::warn!(status, detail = %detail, "IdP refused request");
            if *status == 400 {
                GatewayError::InvalidRequest(detail)
            } else {
                GatewayError::IdpUnavailable
            }
        }
        other => {
            tracing::warn!(error = %other, "IdP unavailable");
            GatewayError::IdpUnavailable
        }
    }
}

fn parse_grant(response: &IdpResponse) -> Result<TokenPair, GatewayError> {
    response
        .json::<TokenGrant>()
        .map(TokenPair::from)
        .map_err(|e| {
            tracing::error!(error = %e, "Unusable token response from IdP");
            GatewayError::IdpUnavailable
        })
}
