//! # Controller Configuration
//!
//! Layered configuration for the pod group controller. Every field carries a
//! default, so an empty (or missing) configuration file yields a working
//! controller; files and environment variables only override.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use podgroup_controller::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let workers = manager.config().driver.workers;
//! let timeout = manager.config().reconcile.timeout();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::{
    DEFAULT_GROUP_LABEL, DEFAULT_READY_LABEL, DEFAULT_RECONCILE_TIMEOUT_MS, DEFAULT_WORKERS,
};
use crate::models::MemberPhase;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Label keys and the phase the whole group must reach
    pub labels: LabelConfig,

    /// Per-invocation reconcile settings
    pub reconcile: ReconcileConfig,

    /// Worker pool and event intake settings
    pub driver: DriverConfig,

    /// Requeue backoff after a failed reconcile
    pub backoff: BackoffConfig,
}

/// Label wire contract
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LabelConfig {
    /// Label whose value names the member's group
    pub group_label: String,
    /// Label set to "true" once the whole group is in `target_phase`
    pub ready_label: String,
    /// Phase every member must be in for the group to count as ready
    pub target_phase: MemberPhase,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            group_label: DEFAULT_GROUP_LABEL.to_string(),
            ready_label: DEFAULT_READY_LABEL.to_string(),
            target_phase: MemberPhase::Running,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Deadline for a single reconcile invocation in milliseconds
    pub timeout_ms: u64,
}

impl ReconcileConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_RECONCILE_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Number of concurrent reconcile workers
    pub workers: usize,
    /// Capacity of the store change feed subscription
    pub event_buffer: usize,
    /// Re-enqueue every known grouped member periodically
    pub resync_enabled: bool,
    /// Resync period in seconds
    pub resync_interval_seconds: u64,
}

impl DriverConfig {
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_seconds)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            event_buffer: 1024,
            resync_enabled: true,
            resync_interval_seconds: 300,
        }
    }
}

/// Backoff configuration for failed reconciles
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    pub max_delay_ms: u64,
    /// Exponential multiplier applied per consecutive failure
    pub multiplier: f64,
    /// Whether to add jitter to spread out retries of one group
    pub jitter_enabled: bool,
    /// Maximum jitter as a fraction of the delay (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter_enabled: true,
            max_jitter: 0.1,
        }
    }
}

impl ControllerConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        if self.labels.group_label.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "labels.group_label",
                &self.labels.group_label,
                "group label key must not be empty",
            ));
        }
        if self.labels.ready_label.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "labels.ready_label",
                &self.labels.ready_label,
                "ready label key must not be empty",
            ));
        }
        if self.labels.group_label == self.labels.ready_label {
            return Err(ConfigurationError::validation_error(format!(
                "group label and ready label must differ (both are '{}')",
                self.labels.group_label
            )));
        }
        if self.reconcile.timeout_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "reconcile.timeout_ms",
                self.reconcile.timeout_ms,
                "reconcile timeout must be greater than zero",
            ));
        }
        if self.driver.workers == 0 {
            return Err(ConfigurationError::invalid_value(
                "driver.workers",
                self.driver.workers,
                "at least one worker is required",
            ));
        }
        if self.driver.event_buffer == 0 {
            return Err(ConfigurationError::invalid_value(
                "driver.event_buffer",
                self.driver.event_buffer,
                "event buffer must hold at least one event",
            ));
        }
        if self.driver.resync_enabled && self.driver.resync_interval_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "driver.resync_interval_seconds",
                self.driver.resync_interval_seconds,
                "resync interval must be greater than zero when resync is enabled",
            ));
        }
        if self.backoff.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                self.backoff.multiplier,
                "multiplier must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.backoff.max_jitter) {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_jitter",
                self.backoff.max_jitter,
                "jitter must be between 0.0 and 1.0",
            ));
        }
        if self.backoff.base_delay_ms > self.backoff.max_delay_ms {
            return Err(ConfigurationError::validation_error(format!(
                "backoff.base_delay_ms ({}) exceeds backoff.max_delay_ms ({})",
                self.backoff.base_delay_ms, self.backoff.max_delay_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.labels.group_label, "pod-group");
        assert_eq!(config.labels.ready_label, "pod-group-ready");
        assert_eq!(config.labels.target_phase, MemberPhase::Running);
        assert_eq!(config.reconcile.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_identical_labels_rejected() {
        let mut config = ControllerConfig::default();
        config.labels.ready_label = config.labels.group_label.clone();
        let error = config.validate().unwrap_err();
        assert!(matches!(error, ConfigurationError::ValidationError { .. }));
    }

    #[test]
    fn test_empty_label_rejected() {
        let mut config = ControllerConfig::default();
        config.labels.group_label = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = ControllerConfig::default();
        config.driver.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_bounds_rejected() {
        let mut config = ControllerConfig::default();
        config.backoff.multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.backoff.max_jitter = 1.5;
        assert!(config.validate().is_err());

        let mut config = ControllerConfig::default();
        config.backoff.base_delay_ms = 10;
        config.backoff.max_delay_ms = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
labels:
  group_label: scheduling.example.io/group
driver:
  workers: 8
"#;
        let config: ControllerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.labels.group_label, "scheduling.example.io/group");
        assert_eq!(config.labels.ready_label, "pod-group-ready");
        assert_eq!(config.driver.workers, 8);
        assert_eq!(config.driver.event_buffer, 1024);
        assert_eq!(config.backoff, BackoffConfig::default());
    }
}
