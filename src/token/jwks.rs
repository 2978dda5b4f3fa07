//! Public key set (JWKS) model and parsing.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::time::Instant;

use crate::config::validation::is_rsa;
use crate::token::KeyError;

/// One verification key published by the IdP. Immutable once parsed.
#[derive(Clone)]
pub struct PublicKey {
    pub key_id: String,
    pub key_type: String,
    pub usage: Option<String>,
    pub algorithm: Option<Algorithm>,
    pub modulus: String,
    pub exponent: String,
    decoding: DecodingKey,
}

impl PublicKey {
    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("key_id", &self.key_id)
            .field("key_type", &self.key_type)
            .field("usage", &self.usage)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// A fetched key set, keyed by `kid`.
#[derive(Debug, Clone)]
pub struct KeySet {
    keys: HashMap<String, Arc<PublicKey>>,
    fetched_at: Instant,
    ttl: Duration,
}

impl KeySet {
    pub fn new(keys: Vec<PublicKey>, ttl: Duration) -> Self {
        Self {
            keys: keys
                .into_iter()
                .map(|key| (key.key_id.clone(), Arc::new(key)))
                .collect(),
            fetched_at: Instant::now(),
            ttl,
        }
    }

    /// Parse a JWKS document. Any signing key missing a required member
    /// invalidates the whole document.
    pub fn parse(body: &str, ttl: Duration) -> Result<Self, KeyError> {
        let document: JwkDocument = serde_json::from_str(body)
            .map_err(|e| KeyError::Fetch(format!("malformed key set: {e}")))?;

        let mut keys = Vec::with_capacity(document.keys.len());
        for raw in document.keys {
            if let Some(key) = raw.into_public_key()? {
                keys.push(key);
            }
        }
        Ok(Self::new(keys, ttl))
    }

    pub fn get(&self, key_id: &str) -> Option<Arc<PublicKey>> {
        self.keys.get(key_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_stale(&self) -> bool {
        self.age() > self.ttl
    }
}

#[derive(Debug, Deserialize)]
struct JwkDocument {
    keys: Vec<RawJwk>,
}

#[derive(Debug, Deserialize)]
struct RawJwk {
    kid: Option<String>,
    kty: Option<String>,
    #[serde(rename = "use")]
    usage: Option<String>,
    alg: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

impl RawJwk {
    /// `Ok(None)` for well-formed keys this gateway cannot use for
    /// signature checks (non-RSA, encryption keys).
    fn into_public_key(self) -> Result<Option<PublicKey>, KeyError> {
        let kid = require(self.kid, "kid", "?")?;
        let kty = require(self.kty, "kty", &kid)?;

        if kty != "RSA" || self.usage.as_deref().is_some_and(|u| u != "sig") {
            tracing::debug!(kid = %kid, kty = %kty, "Skipping non-signing key");
            return Ok(None);
        }

        let algorithm = match self.alg.as_deref() {
            None => None,
            Some(raw) => match Algorithm::from_str(raw) {
                Ok(alg) if is_rsa(alg) => Some(alg),
                _ => {
                    return Err(KeyError::Fetch(format!(
                        "key '{kid}' has unsupported alg '{raw}'"
                    )))
                }
            },
        };

        let n = require(self.n, "n", &kid)?;
        let e = require(self.e, "e", &kid)?;
        let decoding = DecodingKey::from_rsa_components(&n, &e)
            .map_err(|err| KeyError::Fetch(format!("key '{kid}' is not a valid RSA key: {err}")))?;

        Ok(Some(PublicKey {
            key_id: kid,
            key_type: kty,
            usage: self.usage,
            algorithm,
            modulus: n,
            exponent: e,
            decoding,
        }))
    }
}

fn require(value: Option<String>, member: &str, kid: &str) -> Result<String, KeyError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| KeyError::Fetch(format!("key '{kid}' is missing '{member}'")))
}
