//! Key-set cache with single-flight refresh.
//!
//! # Responsibilities
//! - Serve verification keys by `kid` from a cached key set
//! - Refresh lazily on expiry or unknown `kid`, at most one fetch in flight
//! - Keep serving known keys from a stale set while the IdP is unreachable
//!
//! # Design Decisions
//! - The set is swapped atomically (`ArcSwapOption`); readers keep the `Arc`
//!   they loaded for as long as they need it
//! - Waiters share one `Shared` future instead of queueing on a lock
//! - The fetch itself runs as a spawned task, so it reaches the breaker's
//!   verdict even when every waiter is cancelled
//! - One refresh per lookup; an absent `kid` after refresh is final

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use futures_util::future::{BoxFuture, FutureExt, Shared};

use crate::config::JwksConfig;
use crate::idp::{IdentityProviderClient, IdpRequest};
use crate::observability::metrics;
use crate::token::jwks::{KeySet, PublicKey};
use crate::token::KeyError;

type RefreshFuture = Shared<BoxFuture<'static, Result<Arc<KeySet>, KeyError>>>;
type RefreshSlot = Arc<Mutex<Option<RefreshFuture>>>;

pub struct KeySetCache {
    client: Arc<IdentityProviderClient>,
    ttl: Duration,
    min_refresh_interval: Duration,
    current: Arc<ArcSwapOption<KeySet>>,
    in_flight: RefreshSlot,
}

impl KeySetCache {
    pub fn new(client: Arc<IdentityProviderClient>, ttl: Duration) -> Self {
        Self {
            client,
            ttl,
            min_refresh_interval: Duration::ZERO,
            current: Arc::new(ArcSwapOption::empty()),
            in_flight: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_config(client: Arc<IdentityProviderClient>, config: &JwksConfig) -> Self {
        Self::new(client, config.ttl()).with_min_refresh_interval(config.min_refresh_interval())
    }

    /// Don't refetch a fresh set for an unknown `kid` more often than this.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// The set currently held, fresh or not.
    pub fn current(&self) -> Option<Arc<KeySet>> {
        self.current.load_full()
    }

    pub async fn get_key(&self, key_id: &str) -> Result<Arc<PublicKey>, KeyError> {
        let held = self.current.load_full();

        if let Some(set) = held.as_ref().filter(|set| !set.is_stale()) {
            if let Some(key) = set.get(key_id) {
                return Ok(key);
            }
            if set.age() < self.min_refresh_interval {
                return Err(KeyError::NotFound(key_id.to_string()));
            }
            tracing::debug!(kid = %key_id, "Unknown key id, refreshing key set");
        }

        match self.refresh().await {
            Ok(set) => set
                .get(key_id)
                .ok_or_else(|| KeyError::NotFound(key_id.to_string())),
            Err(err) => match held.as_ref().and_then(|set| set.get(key_id)) {
                Some(key) => {
                    tracing::warn!(
                        kid = %key_id,
                        error = %err,
                        "Key-set refresh failed, serving key from stale set"
                    );
                    Ok(key)
                }
                None => Err(err),
            },
        }
    }

    /// Fetch a new set, joining a fetch already in flight if there is one.
    pub async fn refresh(&self) -> Result<Arc<KeySet>, KeyError> {
        let fetch = {
            let mut slot = lock_slot(&self.in_flight);
            match slot.as_ref() {
                Some(fetch) => fetch.clone(),
                None => {
                    // The task cannot clear the slot before this guard drops.
                    let fetch = self.spawn_fetch();
                    *slot = Some(fetch.clone());
                    fetch
                }
            }
        };

        fetch.await
    }

    fn spawn_fetch(&self) -> RefreshFuture {
        let client = self.client.clone();
        let current = self.current.clone();
        let ttl = self.ttl;
        let release = ReleaseSlot(self.in_flight.clone());

        let task = tokio::spawn(async move {
            let _release = release;
            fetch_key_set(client, current, ttl).await
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(KeyError::Fetch(format!("key-set refresh aborted: {e}"))))
        }
        .boxed()
        .shared()
    }
}

fn lock_slot(slot: &RefreshSlot) -> MutexGuard<'_, Option<RefreshFuture>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Empties the in-flight slot when the fetch task ends, panics included.
struct ReleaseSlot(RefreshSlot);

impl Drop for ReleaseSlot {
    fn drop(&mut self) {
        *lock_slot(&self.0) = None;
    }
}

async fn fetch_key_set(
    client: Arc<IdentityProviderClient>,
    current: Arc<ArcSwapOption<KeySet>>,
    ttl: Duration,
) -> Result<Arc<KeySet>, KeyError> {
    let response = match client.call(&IdpRequest::key_set()).await {
        Ok(response) => response,
        Err(e) => {
            metrics::record_key_set_refresh("failure");
            return Err(KeyError::Fetch(e.to_string()));
        }
    };

    // A replayed response carries nothing newer than the set already held.
    if response.stale {
        metrics::record_key_set_refresh("failure");
        return Err(KeyError::Fetch("IdP unavailable (circuit open)".to_string()));
    }

    let set = match KeySet::parse(&response.body, ttl) {
        Ok(set) => Arc::new(set),
        Err(e) => {
            metrics::record_key_set_refresh("invalid");
            tracing::error!(error = %e, "Rejected key set from IdP");
            return Err(e);
        }
    };

    current.store(Some(set.clone()));
    metrics::record_key_set_refresh("success");
    tracing::info!(keys = set.len(), ttl = ?ttl, "Key set refreshed");
    Ok(set)
}
