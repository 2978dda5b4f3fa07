//! Request, response and error types for outbound IdP calls.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::time::Instant;

use crate::config::IdpConfig;

/// Which IdP endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Token,
    KeySet,
    Health,
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Token => "token",
            Endpoint::KeySet => "key_set",
            Endpoint::Health => "health",
        }
    }
}

/// An outbound request. Transport details (URL, method) are resolved by the
/// transport from the endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct IdpRequest {
    pub endpoint: Endpoint,
    pub body: Option<Value>,
}

impl IdpRequest {
    pub fn token(payload: Value) -> Self {
        Self {
            endpoint: Endpoint::Token,
            body: Some(payload),
        }
    }

    pub fn key_set() -> Self {
        Self {
            endpoint: Endpoint::KeySet,
            body: None,
        }
    }

    pub fn health() -> Self {
        Self {
            endpoint: Endpoint::Health,
            body: None,
        }
    }

    /// Resource-owner password grant for `username`.
    pub fn password_grant(config: &IdpConfig, username: &str, password: &str) -> Self {
        let mut payload = client_payload(config, &config.grant_type);
        payload.insert("username".into(), json!(username));
        payload.insert("password".into(), json!(password));
        if let Some(realm) = &config.realm {
            payload.insert("realm".into(), json!(realm));
        }
        Self::token(Value::Object(payload))
    }

    /// Exchange a refresh token for a new token pair.
    pub fn refresh_grant(config: &IdpConfig, refresh_token: &str) -> Self {
        let mut payload = client_payload(config, "refresh_token");
        payload.insert("refresh_token".into(), json!(refresh_token));
        Self::token(Value::Object(payload))
    }
}

fn client_payload(config: &IdpConfig, grant_type: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("grant_type".into(), json!(grant_type));
    payload.insert("client_id".into(), json!(config.client_id));
    payload.insert("client_secret".into(), json!(config.client_secret));
    payload.insert("audience".into(), json!(config.audience));
    if let Some(scope) = &config.scope {
        payload.insert("scope".into(), json!(scope));
    }
    payload
}

/// What a transport hands back: status and body, nothing interpreted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// A successful IdP response.
#[derive(Debug, Clone, PartialEq)]
pub struct IdpResponse {
    pub status: u16,
    pub body: String,
    pub received_at: Instant,
    /// Served from the fallback cache because the circuit was open.
    pub stale: bool,
}

impl IdpResponse {
    pub(crate) fn fresh(raw: RawResponse) -> Self {
        Self {
            status: raw.status,
            body: raw.body,
            received_at: Instant::now(),
            stale: false,
        }
    }

    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, IdpError> {
        serde_json::from_str(&self.body).map_err(|e| IdpError::InvalidResponse(e.to_string()))
    }
}

/// Token endpoint success body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token endpoint error body (`{error, error_description}`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdpErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// No response was obtained from the IdP.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(Duration::ZERO)
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// Failure of a logical IdP call, after retries and breaker handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdpError {
    #[error("IdP unavailable (circuit open)")]
    CircuitOpen,

    #[error("IdP request failed after retries")]
    RetriesExhausted { attempts: u32, last: String },

    /// A non-retryable 4xx. The IdP is healthy; the request was refused.
    #[error("IdP rejected the request with status {status}")]
    Rejected { status: u16, body: String },

    #[error("invalid IdP response: {0}")]
    InvalidResponse(String),
}

impl IdpError {
    /// The IdP could not be reached or is being shed.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, IdpError::CircuitOpen | IdpError::RetriesExhausted { .. })
    }

    /// Parsed error body of a rejection, if the IdP sent one.
    pub fn rejection(&self) -> Option<IdpErrorBody> {
        match self {
            IdpError::Rejected { body, .. } => serde_json::from_str(body).ok(),
            _ => None,
        }
    }
}

/// The client could not be constructed from configuration.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("invalid IdP URL '{url}': {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
