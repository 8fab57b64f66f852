//! Error types for the pod group controller.
//!
//! Three layers, each with its own `Result` alias:
//! - [`StoreError`] for the member store adapter
//! - [`ReconcileError`] for a single reconcile pass (always retryable)
//! - [`ControllerError`] for controller lifecycle (config, driver, CLI)

use crate::config::ConfigurationError;
use crate::models::MemberKey;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a [`crate::store::MemberStore`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The member does not exist (never created, or deleted)
    #[error("Member {key} not found")]
    NotFound { key: MemberKey },

    /// The member changed since it was read; the write was rejected
    #[error("Conflict updating {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        key: MemberKey,
        expected: u64,
        actual: u64,
    },

    /// The store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failure of one reconcile pass.
///
/// Every variant is retryable: the driver owns backoff and the next pass
/// re-reads state from scratch, so there is no transient/permanent split.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// Fetching the triggering member failed for a reason other than NotFound
    #[error("Failed to fetch member {key}: {source}")]
    Fetch {
        key: MemberKey,
        #[source]
        source: StoreError,
    },

    /// Listing group members failed; membership is unknown so nothing was evaluated
    #[error("Failed to list members of group {group} in namespace {namespace}: {source}")]
    List {
        namespace: String,
        group: String,
        #[source]
        source: StoreError,
    },

    /// Writing the readiness marker failed; `applied` members were marked before it
    #[error("Failed to mark member {key} ready ({applied} marked earlier in this pass): {source}")]
    Update {
        key: MemberKey,
        applied: usize,
        #[source]
        source: StoreError,
    },

    /// A store call outlived the reconcile deadline
    #[error("Reconcile deadline of {timeout:?} exceeded during {operation}")]
    DeadlineExceeded {
        operation: &'static str,
        timeout: Duration,
    },

    /// The driver signalled shutdown while a store call was in flight
    #[error("Reconcile cancelled during {operation}")]
    Cancelled { operation: &'static str },
}

impl ReconcileError {
    /// All reconcile failures are assumed transient and eventually convergent
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Stable short label for logs and metric attributes
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::List { .. } => "list",
            Self::Update { source, .. } if source.is_conflict() => "update_conflict",
            Self::Update { .. } => "update",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

pub type ReconcileResult<T> = std::result::Result<T, ReconcileError>;

/// Top-level controller error
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Reconcile error: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Driver error: {0}")]
    Driver(String),
}

impl From<serde_yaml::Error> for ControllerError {
    fn from(error: serde_yaml::Error) -> Self {
        ControllerError::Manifest(format!("YAML parsing error: {error}"))
    }
}

impl From<std::io::Error> for ControllerError {
    fn from(error: std::io::Error) -> Self {
        ControllerError::Manifest(format!("I/O error: {error}"))
    }
}

pub type ControllerResult<T> = std::result::Result<T, ControllerError>;
