//! Login brute-force protection.
//!
//! # Responsibilities
//! - Count failed logins per (identity, source) within a window
//! - Lock the pair out once the threshold is reached
//! - Forget idle records (periodic sweep)
//!
//! # Design Decisions
//! - Per-key atomic read-modify-write through the `DashMap` entry lock;
//!   concurrent failures for one key are never lost
//! - Identities are compared case-insensitively, trimmed
//! - The counter restarts after a lockout is imposed

use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::time::Instant;

use crate::config::LoginGuardConfig;
use crate::observability::metrics;

/// Who is trying and from where.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttemptKey {
    identity: String,
    source: String,
}

impl AttemptKey {
    pub fn new(identity: &str, source: impl Into<String>) -> Self {
        Self {
            identity: identity.trim().to_lowercase(),
            source: source.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    pub count: u32,
    pub window_start: Instant,
    pub blocked_until: Option<Instant>,
    pub last_seen: Instant,
}

impl AttemptRecord {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            blocked_until: None,
            last_seen: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("too many failed login attempts, retry in {}s", .retry_after.as_secs())]
pub struct LockedOut {
    pub retry_after: Duration,
}

#[derive(Debug)]
pub struct LoginAttemptGuard {
    threshold: u32,
    window: Duration,
    lockout: Duration,
    records: DashMap<AttemptKey, AttemptRecord>,
}

impl LoginAttemptGuard {
    pub fn new(threshold: u32, window: Duration, lockout: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            window,
            lockout,
            records: DashMap::new(),
        }
    }

    pub fn from_config(config: &LoginGuardConfig) -> Self {
        Self::new(
            config.threshold,
            Duration::from_secs(config.window_secs),
            Duration::from_secs(config.lockout_secs),
        )
    }

    /// Refuse if the key is currently locked out.
    pub fn check(&self, key: &AttemptKey) -> Result<(), LockedOut> {
        let now = Instant::now();
        let Some(record) = self.records.get(key) else {
            return Ok(());
        };
        match record.blocked_until {
            Some(until) if until > now => Err(LockedOut {
                retry_after: until - now,
            }),
            _ => Ok(()),
        }
    }

    /// Count a failed attempt. Returns the lockout if this failure imposed one.
    pub fn record_failure(&self, key: &AttemptKey) -> Option<LockedOut> {
        let now = Instant::now();
        let mut entry = self
            .records
            .entry(key.clone())
            .or_insert_with(|| AttemptRecord::new(now));
        let record = entry.value_mut();

        if record.blocked_until.is_some_and(|until| until <= now) {
            record.blocked_until = None;
        }
        if now.duration_since(record.window_start) > self.window {
            record.count = 0;
            record.window_start = now;
        }

        record.count += 1;
        record.last_seen = now;

        if record.count < self.threshold {
            return None;
        }

        record.blocked_until = Some(now + self.lockout);
        record.count = 0;
        record.window_start = now;
        drop(entry);

        metrics::record_lockout();
        tracing::warn!(
            identity = %key.identity,
            source = %key.source,
            lockout = ?self.lockout,
            "Login locked out after repeated failures"
        );
        Some(LockedOut {
            retry_after: self.lockout,
        })
    }

    /// A successful login clears the key's history.
    pub fn record_success(&self, key: &AttemptKey) {
        self.records.remove(key);
    }

    pub fn record(&self, key: &AttemptKey) -> Option<AttemptRecord> {
        self.records.get(key).map(|r| *r)
    }

    /// Drop records idle for longer than the window and not locked out.
    /// Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| {
            let blocked = record.blocked_until.is_some_and(|until| until > now);
            blocked || now.duration_since(record.last_seen) <= self.window
        });
        before.saturating_sub(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
