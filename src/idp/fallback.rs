//! Last known-good responses, served while the circuit is open.

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::idp::types::{Endpoint, IdpResponse};

/// One slot per endpoint that allows fallback; each success overwrites it.
#[derive(Debug)]
pub struct FallbackCache {
    key_set: ArcSwapOption<IdpResponse>,
    health: ArcSwapOption<IdpResponse>,
}

impl Default for FallbackCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FallbackCache {
    pub fn new() -> Self {
        Self {
            key_set: ArcSwapOption::empty(),
            health: ArcSwapOption::empty(),
        }
    }

    /// Credentials are never replayed, so the token endpoint has no slot.
    fn slot(&self, endpoint: Endpoint) -> Option<&ArcSwapOption<IdpResponse>> {
        match endpoint {
            Endpoint::Token => None,
            Endpoint::KeySet => Some(&self.key_set),
            Endpoint::Health => Some(&self.health),
        }
    }

    pub fn store(&self, endpoint: Endpoint, response: &IdpResponse) {
        if let Some(slot) = self.slot(endpoint) {
            slot.store(Some(Arc::new(response.clone())));
        }
    }

    /// The cached response marked stale, keeping its original timestamp.
    pub fn load(&self, endpoint: Endpoint) -> Option<IdpResponse> {
        let cached = self.slot(endpoint)?.load_full()?;
        Some(IdpResponse {
            stale: true,
            ..(*cached).clone()
        })
    }
}
