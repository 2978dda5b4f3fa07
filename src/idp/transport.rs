//! Wire transport for IdP calls.
//!
//! The client talks to a `dyn IdpTransport` so retries, breaker and fallback
//! can be exercised without a network.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::header::ACCEPT;
use url::Url;

use crate::config::IdpConfig;
use crate::idp::types::{ClientBuildError, Endpoint, IdpRequest, RawResponse, TransportError};

/// Sends one request and returns whatever the IdP answered.
///
/// Implementations must not retry and must not interpret status codes.
pub trait IdpTransport: Send + Sync + 'static {
    fn send<'a>(
        &'a self,
        request: &'a IdpRequest,
    ) -> BoxFuture<'a, Result<RawResponse, TransportError>>;
}

/// Resolved IdP URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpEndpoints {
    pub token: Url,
    pub key_set: Url,
    /// Falls back to the key-set URL when unset.
    pub health: Option<Url>,
}

impl IdpEndpoints {
    pub fn from_config(config: &IdpConfig) -> Result<Self, ClientBuildError> {
        Ok(Self {
            token: parse_url(&config.token_url)?,
            key_set: parse_url(&config.jwks_url)?,
            health: config.health_url.as_deref().map(parse_url).transpose()?,
        })
    }

    fn health(&self) -> &Url {
        self.health.as_ref().unwrap_or(&self.key_set)
    }
}

fn parse_url(raw: &str) -> Result<Url, ClientBuildError> {
    Url::parse(raw).map_err(|source| ClientBuildError::Url {
        url: raw.to_string(),
        source,
    })
}

/// HTTP transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoints: IdpEndpoints,
}

impl HttpTransport {
    /// `connect_timeout` bounds connection setup only; the per-attempt
    /// deadline is enforced by the client.
    pub fn new(
        endpoints: IdpEndpoints,
        connect_timeout: Duration,
    ) -> Result<Self, ClientBuildError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client, endpoints })
    }

    pub fn from_config(config: &IdpConfig) -> Result<Self, ClientBuildError> {
        Self::new(IdpEndpoints::from_config(config)?, config.request_timeout())
    }
}

impl IdpTransport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: &'a IdpRequest,
    ) -> BoxFuture<'a, Result<RawResponse, TransportError>> {
        Box::pin(async move {
            let mut builder = match request.endpoint {
                Endpoint::Token => self.client.post(self.endpoints.token.clone()),
                Endpoint::KeySet => self.client.get(self.endpoints.key_set.clone()),
                Endpoint::Health => self.client.get(self.endpoints.health().clone()),
            };
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            let response = builder.header(ACCEPT, "application/json").send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(RawResponse { status, body })
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_url_defaults_to_key_set() {
        let endpoints = IdpEndpoints::from_config(&IdpConfig::default()).unwrap();
        assert_eq!(endpoints.health(), &endpoints.key_set);

        let config = IdpConfig {
            health_url: Some("https://idp.example.com/status".into()),
            ..IdpConfig::default()
        };
        let endpoints = IdpEndpoints::from_config(&config).unwrap();
        assert_eq!(endpoints.health().path(), "/status");
    }

    #[test]
    fn test_bad_url_is_reported() {
        let config = IdpConfig {
            token_url: "not a url".into(),
            ..IdpConfig::default()
        };
        assert!(matches!(
            IdpEndpoints::from_config(&config),
            Err(ClientBuildError::Url { .. })
        ));
    }
}
