//! Periodic cleanup of per-client state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::security::{LoginAttemptGuard, RequestThrottle};

/// Drops idle login-attempt records and rolled-over throttle windows.
pub struct Sweeper {
    guard: Arc<LoginAttemptGuard>,
    throttle: Option<Arc<RequestThrottle>>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(
        guard: Arc<LoginAttemptGuard>,
        throttle: Option<Arc<RequestThrottle>>,
        interval: Duration,
    ) -> Self {
        Self {
            guard,
            throttle,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval = ?self.interval, "Sweeper starting");

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep_once(),
                _ = shutdown.recv() => {
                    tracing::info!("Sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn sweep_once(&self) {
        let attempts = self.guard.sweep();
        let windows = self.throttle.as_ref().map_or(0, |t| t.sweep());
        if attempts > 0 || windows > 0 {
            tracing::debug!(
                attempt_records = attempts,
                throttle_windows = windows,
                remaining = self.guard.len(),
                "Swept idle records"
            );
        }
    }
}
