//! Failure-isolating IdP client.
//!
//! # Responsibilities
//! - Issue every outbound IdP call (the only component that does)
//! - Retry transient failures with backoff, under a per-attempt deadline
//! - Fail fast through the circuit breaker while the IdP is down
//! - Serve the last known-good response for endpoints that allow it
//!
//! # Call Flow
//! ```text
//! for attempt in 0..max_attempts:
//!     breaker.call(transport.send) ─┬─ Ok            → cache, return
//!                                   ├─ Open          → fallback or CircuitOpen
//!                                   ├─ permanent 4xx → Rejected
//!                                   └─ transient     → sleep(delay(attempt))
//! RetriesExhausted
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::idp::fallback::FallbackCache;
use crate::idp::transport::{HttpTransport, IdpTransport};
use crate::idp::types::{
    ClientBuildError, Endpoint, IdpError, IdpRequest, IdpResponse, RawResponse, TransportError,
};
use crate::observability::metrics;
use crate::resilience::retries::{classify_status, classify_transport_failure};
use crate::resilience::{
    with_timeout, BackoffPolicy, BreakerError, BreakerSnapshot, CircuitBreaker, FailureClass,
};

/// Why a single attempt failed.
#[derive(Debug)]
enum AttemptError {
    Transport(TransportError),
    Status { response: RawResponse, class: FailureClass },
}

impl AttemptError {
    fn class(&self) -> FailureClass {
        match self {
            AttemptError::Transport(_) => classify_transport_failure(),
            AttemptError::Status { class, .. } => *class,
        }
    }

    fn describe(&self) -> String {
        match self {
            AttemptError::Transport(e) => e.to_string(),
            AttemptError::Status { response, .. } => format!("status {}", response.status),
        }
    }
}

pub struct IdentityProviderClient {
    transport: Arc<dyn IdpTransport>,
    breaker: CircuitBreaker,
    backoff: BackoffPolicy,
    request_timeout: Duration,
    fallback: FallbackCache,
}

impl std::fmt::Debug for IdentityProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProviderClient")
            .field("breaker", &self.breaker)
            .field("backoff", &self.backoff)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl IdentityProviderClient {
    pub fn new(
        transport: Arc<dyn IdpTransport>,
        breaker: CircuitBreaker,
        backoff: BackoffPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            breaker,
            backoff,
            request_timeout,
            fallback: FallbackCache::new(),
        }
    }

    /// HTTP client wired from configuration.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ClientBuildError> {
        let transport = HttpTransport::from_config(&config.idp)?;
        Ok(Self::new(
            Arc::new(transport),
            CircuitBreaker::from_config("idp", &config.circuit_breaker),
            BackoffPolicy::from_config(&config.retries),
            config.idp.request_timeout(),
        ))
    }

    pub fn breaker(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    /// Perform one logical call.
    pub async fn call(&self, request: &IdpRequest) -> Result<IdpResponse, IdpError> {
        let endpoint = request.endpoint;
        let max_attempts = self.backoff.max_attempts();
        let mut last = String::new();

        for attempt in 0..max_attempts {
            let outcome = self
                .breaker
                .call(|| self.attempt(request), |e: &AttemptError| e.class().is_unhealthy())
                .await;

            match outcome {
                Ok(raw) => {
                    metrics::record_idp_attempt(endpoint.name(), "success");
                    let response = IdpResponse::fresh(raw);
                    self.fallback.store(endpoint, &response);
                    return Ok(response);
                }
                Err(BreakerError::Open(_)) => {
                    metrics::record_idp_attempt(endpoint.name(), "short_circuited");
                    return self.serve_fallback(endpoint);
                }
                Err(BreakerError::Inner(AttemptError::Status { response, class }))
                    if !class.is_retryable() =>
                {
                    metrics::record_idp_attempt(endpoint.name(), "rejected");
                    tracing::debug!(
                        endpoint = endpoint.name(),
                        status = response.status,
                        "IdP rejected request"
                    );
                    return Err(IdpError::Rejected {
                        status: response.status,
                        body: response.body,
                    });
                }
                Err(BreakerError::Inner(err)) => {
                    metrics::record_idp_attempt(endpoint.name(), "transient_failure");
                    last = err.describe();
                    if attempt + 1 < max_attempts {
                        let delay = self.backoff.delay(attempt);
                        tracing::warn!(
                            endpoint = endpoint.name(),
                            attempt = attempt + 1,
                            max_attempts,
                            error = %last,
                            delay = ?delay,
                            "IdP call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::warn!(
            endpoint = endpoint.name(),
            attempts = max_attempts,
            error = %last,
            "IdP call failed after retries"
        );
        Err(IdpError::RetriesExhausted {
            attempts: max_attempts,
            last,
        })
    }

    async fn attempt(&self, request: &IdpRequest) -> Result<RawResponse, AttemptError> {
        let raw = with_timeout(self.request_timeout, self.transport.send(request))
            .await
            .map_err(|elapsed| AttemptError::Transport(TransportError::Timeout(elapsed.0)))?
            .map_err(AttemptError::Transport)?;

        match classify_status(raw.status) {
            None => Ok(raw),
            Some(class) => Err(AttemptError::Status { response: raw, class }),
        }
    }

    fn serve_fallback(&self, endpoint: Endpoint) -> Result<IdpResponse, IdpError> {
        match self.fallback.load(endpoint) {
            Some(response) => {
                tracing::info!(
                    endpoint = endpoint.name(),
                    age = ?response.age(),
                    "Circuit open, serving cached IdP response"
                );
                Ok(response)
            }
            None => Err(IdpError::CircuitOpen),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idp::transport::testing::ScriptedTransport;
    use crate::resilience::CircuitState;

    fn client(
        transport: &Arc<ScriptedTransport>,
        fail_max: u32,
        max_attempts: u32,
    ) -> IdentityProviderClient {
        let backoff = BackoffPolicy::new(
            max_attempts,
            Duration::from_millis(100),
            2.0,
            Duration::from_secs(1),
        );
        IdentityProviderClient::new(
            transport.clone(),
            CircuitBreaker::new("idp", fail_max, Duration::from_secs(30)),
            backoff,
            Duration::from_secs(1),
        )
    }

    fn refused() -> Result<RawResponse, TransportError> {
        Err(TransportError::Connect("connection refused".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_retried() {
        let transport = Arc::new(ScriptedTransport::new(|_, n| {
            if n < 2 {
                Ok(RawResponse::new(503, "unavailable"))
            } else {
                Ok(RawResponse::new(200, r#"{"keys":[]}"#))
            }
        }));
        let client = client(&transport, 5, 3);

        let response = client.call(&IdpRequest::key_set()).await.unwrap();
        assert_eq!(response.status, 200);
        assert!(!response.stale);
        assert_eq!(transport.calls(), 3);
        assert_eq!(client.breaker().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_rejection_is_not_retried_or_counted() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| {
            Ok(RawResponse::new(403, r#"{"error":"invalid_grant"}"#))
        }));
        let client = client(&transport, 1, 3);

        let err = client
            .call(&IdpRequest::token(serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, IdpError::Rejected { status: 403, .. }));
        assert_eq!(transport.calls(), 1);
        assert_eq!(client.breaker().state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_credentials_do_not_mask_outage() {
        let transport = Arc::new(ScriptedTransport::new(|_, n| match n {
            2 => Ok(RawResponse::new(403, r#"{"error":"invalid_grant"}"#)),
            _ => Ok(RawResponse::new(503, "unavailable")),
        }));
        let client = client(&transport, 3, 1);
        let request = IdpRequest::token(serde_json::json!({}));

        let mut failures = Vec::new();
        for _ in 0..4 {
            let _ = client.call(&request).await;
            failures.push(client.breaker().consecutive_failures);
        }

        assert_eq!(failures, vec![1, 2, 2, 3]);
        assert!(matches!(client.breaker().state, CircuitState::Open { .. }));
        assert_eq!(client.call(&request).await.unwrap_err(), IdpError::CircuitOpen);
        assert_eq!(transport.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiting_is_retried_without_tripping() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| Ok(RawResponse::new(429, ""))));
        let client = client(&transport, 1, 3);

        let err = client.call(&IdpRequest::key_set()).await.unwrap_err();
        assert!(matches!(err, IdpError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(transport.calls(), 3);
        assert_eq!(client.breaker().state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_short_circuits_without_calling() {
        let transport = Arc::new(ScriptedTransport::new(|_, _| refused()));
        let client = client(&transport, 3, 1);
        let request = IdpRequest::token(serde_json::json!({}));

        for _ in 0..3 {
            let err = client.call(&request).await.unwrap_err();
            assert!(matches!(err, IdpError::RetriesExhausted { .. }));
        }
        assert_eq!(client.call(&request).await.unwrap_err(), IdpError::CircuitOpen);
        assert_eq!(transport.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_serves_stale_key_set() {
        let transport = Arc::new(ScriptedTransport::new(|_, n| {
            if n == 0 {
                Ok(RawResponse::new(200, r#"{"keys":[]}"#))
            } else {
                refused()
            }
        }));
        let client = client(&transport, 2, 1);

        client.call(&IdpRequest::key_set()).await.unwrap();
        let _ = client.call(&IdpRequest::key_set()).await;
        let _ = client.call(&IdpRequest::key_set()).await;

        let served = client.call(&IdpRequest::key_set()).await.unwrap();
        assert!(served.stale);
        assert_eq!(served.body, r#"{"keys":[]}"#);
        assert_eq!(transport.calls(), 3);

        // Credentials are never replayed.
        let err = client
            .call(&IdpRequest::token(serde_json::json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, IdpError::CircuitOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_and_counts() {
        let transport = Arc::new(
            ScriptedTransport::new(|_, _| Ok(RawResponse::new(200, "{}")))
                .with_latency(Duration::from_secs(10)),
        );
        let client = client(&transport, 5, 2);

        let err = client.call(&IdpRequest::health()).await.unwrap_err();
        match err {
            IdpError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.contains("timed out"), "{last}");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(client.breaker().consecutive_failures, 2);
    }
}
