//! Exponential backoff with jitter.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::RetryConfig;

/// Retry delay schedule for outbound calls.
///
/// `delay(n) = min(cap, base * multiplier^n)`, optionally randomized within
/// `±jitter_fraction`. A seeded policy produces the same schedule every time.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    max_attempts: u32,
    base: Duration,
    multiplier: f64,
    cap: Duration,
    jitter_fraction: f64,
    seed: Option<u64>,
}

impl BackoffPolicy {
    pub fn new(max_attempts: u32, base: Duration, multiplier: f64, cap: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            multiplier: multiplier.max(1.0),
            cap,
            jitter_fraction: 0.0,
            seed: None,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            config.multiplier,
            Duration::from_millis(config.max_delay_ms),
        )
        .with_jitter(config.jitter_fraction)
    }

    /// Randomize each delay within `±fraction` of its nominal value.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter_fraction = fraction.clamp(0.0, 0.99);
        self
    }

    /// Make jitter deterministic.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Total attempts allowed for one logical call.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the failed attempt with 0-based index `attempt`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let nominal = self.nominal_ms(attempt);
        if self.jitter_fraction == 0.0 || nominal == 0.0 {
            return Duration::from_millis(nominal as u64);
        }

        let spread = nominal * self.jitter_fraction;
        let offset = match self.seed {
            Some(seed) => {
                StdRng::seed_from_u64(seed.wrapping_add(attempt as u64)).gen_range(-spread..=spread)
            }
            None => rand::thread_rng().gen_range(-spread..=spread),
        };

        Duration::from_millis((nominal + offset).max(0.0) as u64)
    }

    /// The full schedule: one delay between each pair of attempts.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay(attempt))
            .collect()
    }

    fn nominal_ms(&self, attempt: u32) -> f64 {
        let cap = self.cap.as_millis() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let grown = self.base.as_millis() as f64 * self.multiplier.powi(exponent);
        if grown.is_finite() {
            grown.min(cap)
        } else {
            cap
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy::new(5, Duration::from_millis(100), 2.0, Duration::from_millis(1000))
    }

    #[test]
    fn test_backoff_calculation() {
        let p = policy();
        assert_eq!(p.delay(0), Duration::from_millis(100));
        assert_eq!(p.delay(1), Duration::from_millis(200));
        assert_eq!(p.delay(3), Duration::from_millis(800));
        assert_eq!(p.delay(4), Duration::from_millis(1000));
        assert_eq!(p.delay(60), Duration::from_millis(1000));
    }

    #[test]
    fn test_schedule_has_one_delay_between_attempts() {
        let p = policy();
        assert_eq!(p.schedule().len(), 4);

        let single = BackoffPolicy::new(1, Duration::from_millis(100), 2.0, Duration::from_secs(1));
        assert!(single.schedule().is_empty());
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let p = policy().with_jitter(0.1);
        for _ in 0..100 {
            let d = p.delay(1).as_millis();
            assert!((180..=220).contains(&d), "delay {d} out of bounds");
        }
    }

    #[test]
    fn test_seeded_jitter_is_deterministic() {
        let a = policy().with_jitter(0.5).with_seed(7);
        let b = policy().with_jitter(0.5).with_seed(7);
        assert_eq!(a.schedule(), b.schedule());
    }

    #[test]
    fn test_zero_attempts_is_clamped() {
        let p = BackoffPolicy::new(0, Duration::from_millis(1), 1.0, Duration::from_millis(1));
        assert_eq!(p.max_attempts(), 1);
    }
}
