//! # Controller Constants
//!
//! Label keys and values that form the wire contract between the controller
//! and the rest of the cluster, plus defaults shared by config and driver.

/// Label that declares group membership; its value is the opaque group name
pub const DEFAULT_GROUP_LABEL: &str = "pod-group";

/// Label written on every member once its whole group has reached the target phase
pub const DEFAULT_READY_LABEL: &str = "pod-group-ready";

/// The only marker value that counts as "ready"
pub const READY_VALUE: &str = "true";

/// Environment variable prefix for configuration overrides (`PODGROUP__DRIVER__WORKERS=8`)
pub const CONFIG_ENV_PREFIX: &str = "PODGROUP";

/// Default per-invocation reconcile deadline
pub const DEFAULT_RECONCILE_TIMEOUT_MS: u64 = 10_000;

/// Default number of concurrent reconcile workers
pub const DEFAULT_WORKERS: usize = 4;

/// System-level identifiers used in logs and metrics
pub mod system {
    pub const CONTROLLER_NAME: &str = "podgroup-controller";
    pub const METER_NAME: &str = "podgroup-controller";
}
