//! # Reconciler
//!
//! The gang-readiness decision logic: resolve a group's members, evaluate
//! their phases, and mark every member once the whole group is ready.
//!
//! The pieces are usable on their own ([`MembershipResolver`],
//! [`ReadinessEvaluator`], [`MarkerApplier`]) and composed by
//! [`PodGroupReconciler`], which implements the [`Reconciler`] contract the
//! driver calls. [`GroupLabelFilter`] is the [`EventFilter`] registered with
//! the driver so ungrouped members are never enqueued.

pub mod context;
pub mod filter;
pub mod marker;
pub mod membership;
pub mod pod_group;
pub mod readiness;

use crate::errors::ReconcileResult;
use crate::models::MemberKey;
use async_trait::async_trait;

pub use context::ReconcileContext;
pub use filter::{EventFilter, GroupLabelFilter};
pub use marker::{MarkerApplier, MarkerReport};
pub use membership::{GroupMembership, MembershipResolver};
pub use pod_group::{PodGroupReconciler, ReconcileOutcome};
pub use readiness::{GroupVerdict, ReadinessEvaluator};

/// Contract between the driver and reconcile logic: one member key per call,
/// never two concurrent calls for the same key.
#[async_trait]
pub trait Reconciler: Send + Sync + std::fmt::Debug {
    async fn reconcile(
        &self,
        key: &MemberKey,
        ctx: &ReconcileContext,
    ) -> ReconcileResult<ReconcileOutcome>;
}
