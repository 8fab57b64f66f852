#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Pod Group Controller
//!
//! Gang readiness for independently scheduled pods.
//!
//! ## Overview
//!
//! Pods declare membership in a group through a label (`pod-group` by
//! default). Whenever a grouped pod changes, the controller lists every pod
//! sharing that label value in the namespace, and once all of them are
//! `Running` it labels each one `pod-group-ready=true`. The marker is never
//! removed by the controller.
//!
//! ## Architecture
//!
//! - **Level-triggered**: every reconcile re-reads the member and its group
//!   from the store; no group state is cached or persisted.
//! - **Partial-failure convergence**: markers are written one member at a
//!   time without rollback; a failed write fails the pass and the driver
//!   retries, skipping members already marked.
//! - **Optimistic concurrency**: writes carry the resource version they read,
//!   so a member that changed after listing is never marked from stale data.
//!
//! ## Module Organization
//!
//! - [`models`] - Member records and phases
//! - [`store`] - Store contract, in-memory store with watch feed, manifests
//! - [`reconciler`] - Membership resolution, readiness evaluation, marker application
//! - [`driver`] - Work queue, backoff and worker pool around the reconciler
//! - [`config`] - Layered configuration
//! - [`errors`] - Structured error handling
//! - [`logging`] / [`metrics`] - Tracing and OpenTelemetry instruments
//!
//! ## Quick Start
//!
//! ```rust
//! use podgroup_controller::config::ControllerConfig;
//! use podgroup_controller::models::{Member, MemberKey, MemberPhase};
//! use podgroup_controller::reconciler::{PodGroupReconciler, ReconcileContext, ReconcileOutcome, Reconciler};
//! use podgroup_controller::store::InMemoryMemberStore;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let config = ControllerConfig::default();
//! let store = Arc::new(InMemoryMemberStore::new());
//! for name in ["p1", "p2"] {
//!     store.apply(
//!         Member::new("default", name)
//!             .with_label("pod-group", "job-1")
//!             .with_phase(MemberPhase::Running),
//!     );
//! }
//!
//! let reconciler = PodGroupReconciler::new(store.clone(), &config.labels);
//! let ctx = ReconcileContext::new(config.reconcile.timeout());
//! let outcome = reconciler.reconcile(&MemberKey::new("default", "p1"), &ctx).await.unwrap();
//! assert_eq!(outcome.written(), 2);
//! assert!(matches!(outcome, ReconcileOutcome::Ready { .. }));
//! # });
//! ```

pub mod config;
pub mod constants;
pub mod driver;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod reconciler;
pub mod store;

pub use config::{ConfigManager, ControllerConfig};
pub use driver::{DriverHandle, DriverStats, ReconcileDriver};
pub use errors::{
    ControllerError, ControllerResult, ReconcileError, ReconcileResult, StoreError, StoreResult,
};
pub use models::{Member, MemberKey, MemberPhase};
pub use reconciler::{
    EventFilter, GroupLabelFilter, PodGroupReconciler, ReconcileContext, ReconcileOutcome,
    Reconciler,
};
pub use store::{InMemoryMemberStore, LabelSelector, MemberEvent, MemberStore};

use std::sync::Arc;

/// Wire a reconciler, the group-label filter and a driver over `store`
pub fn build_driver<S>(store: Arc<S>, config: &ControllerConfig) -> ReconcileDriver
where
    S: MemberStore + 'static,
{
    let reconciler = Arc::new(PodGroupReconciler::new(store, &config.labels));
    let filter = Arc::new(GroupLabelFilter::new(&config.labels.group_label));
    ReconcileDriver::new(reconciler, filter, config)
}
