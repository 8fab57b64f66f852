//! # Requeue Backoff
//!
//! Exponential backoff for keys whose reconcile failed:
//! `base * multiplier^(attempt - 1)`, capped at `max`, with optional jitter so
//! members of one group that failed together do not retry in lockstep.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RequeueBackoff {
    base: Duration,
    max: Duration,
    multiplier: f64,
    jitter_enabled: bool,
    max_jitter: f64,
}

impl Default for RequeueBackoff {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}

impl RequeueBackoff {
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            jitter_enabled: config.jitter_enabled,
            max_jitter: config.max_jitter.clamp(0.0, 1.0),
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.exponential_delay(attempt);
        if self.jitter_enabled {
            self.apply_jitter(delay)
        } else {
            delay
        }
    }

    /// Delay without jitter
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled_nanos = self.base.as_nanos() as f64 * self.multiplier.powi(exponent);

        if !scaled_nanos.is_finite() || scaled_nanos >= self.max.as_nanos() as f64 {
            self.max
        } else {
            Duration::from_nanos(scaled_nanos as u64)
        }
    }

    fn apply_jitter(&self, delay: Duration) -> Duration {
        let jitter_range = delay.as_secs_f64() * self.max_jitter;
        if jitter_range <= 0.0 {
            return delay;
        }

        let offset = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        let jittered = (delay.as_secs_f64() + offset).max(0.0);
        Duration::from_secs_f64(jittered).min(self.max)
    }
}
