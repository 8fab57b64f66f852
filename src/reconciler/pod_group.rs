//! # Pod Group Reconciler
//!
//! Entry point handed one member identity at a time:
//!
//! ```text
//! fetch member ── NotFound ──────────────► MemberGone
//!      │
//!      ├── no group label ────────────────► Ungrouped
//!      ▼
//! resolve membership ── empty ───────────► EmptyGroup
//!      ▼
//! evaluate phases ── not all target ─────► NotReady
//!      ▼
//! apply markers ─────────────────────────► Ready { written, already_marked }
//! ```
//!
//! Nothing is carried between invocations; every call recomputes the verdict
//! from a fresh read.

use super::{
    GroupVerdict, MarkerApplier, MembershipResolver, ReadinessEvaluator, ReconcileContext,
    Reconciler,
};
use crate::config::LabelConfig;
use crate::errors::{ReconcileError, ReconcileResult};
use crate::log_reconcile;
use crate::metrics;
use crate::models::MemberKey;
use crate::store::MemberStore;
use async_trait::async_trait;
use opentelemetry::KeyValue;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Successful reconcile results
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The member no longer exists
    MemberGone,
    /// The member declares no group
    Ungrouped,
    /// The group resolved to no members (the trigger left between fetch and list)
    EmptyGroup { group: String },
    /// Some members are not in the target phase; nothing was written
    NotReady {
        group: String,
        total: usize,
        in_target_phase: usize,
    },
    /// Every member is in the target phase and now carries the marker
    Ready {
        group: String,
        written: usize,
        already_marked: usize,
    },
}

impl ReconcileOutcome {
    /// Stable short label for logs and metric attributes
    pub fn label(&self) -> &'static str {
        match self {
            Self::MemberGone => "member_gone",
            Self::Ungrouped => "ungrouped",
            Self::EmptyGroup { .. } => "empty_group",
            Self::NotReady { .. } => "not_ready",
            Self::Ready { .. } => "ready",
        }
    }

    /// Markers written by this invocation
    pub fn written(&self) -> usize {
        match self {
            Self::Ready { written, .. } => *written,
            _ => 0,
        }
    }
}

pub struct PodGroupReconciler<S: MemberStore> {
    store: Arc<S>,
    group_label: String,
    resolver: MembershipResolver<S>,
    evaluator: ReadinessEvaluator,
    applier: MarkerApplier<S>,
}

impl<S: MemberStore> std::fmt::Debug for PodGroupReconciler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodGroupReconciler")
            .field("group_label", &self.group_label)
            .field("ready_label", &self.applier.ready_label())
            .field("target_phase", &self.evaluator.target_phase())
            .finish()
    }
}

impl<S: MemberStore> PodGroupReconciler<S> {
    pub fn new(store: Arc<S>, labels: &LabelConfig) -> Self {
        Self {
            resolver: MembershipResolver::new(store.clone(), &labels.group_label),
            evaluator: ReadinessEvaluator::new(labels.target_phase),
            applier: MarkerApplier::new(store.clone(), &labels.ready_label),
            group_label: labels.group_label.clone(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn group_label(&self) -> &str {
        &self.group_label
    }

    async fn reconcile_member(
        &self,
        key: &MemberKey,
        ctx: &ReconcileContext,
    ) -> ReconcileResult<ReconcileOutcome> {
        let member = match ctx.guard("fetch", self.store.fetch(key)).await? {
            Ok(member) => member,
            Err(source) if source.is_not_found() => {
                debug!(member = %key, "Member no longer exists, nothing to do");
                return Ok(ReconcileOutcome::MemberGone);
            }
            Err(source) => {
                return Err(ReconcileError::Fetch {
                    key: key.clone(),
                    source,
                })
            }
        };

        let Some(group) = member.group(&self.group_label) else {
            debug!(member = %key, "Member declares no group, skipping");
            return Ok(ReconcileOutcome::Ungrouped);
        };

        let membership = self.resolver.resolve(&key.namespace, group, ctx).await?;
        let verdict = self.evaluator.evaluate(&membership.members);

        let outcome = match &verdict {
            GroupVerdict::Empty => ReconcileOutcome::EmptyGroup {
                group: membership.group.clone(),
            },
            GroupVerdict::NotReady {
                total,
                in_target_phase,
                lagging,
            } => {
                debug!(
                    member = %key,
                    group = %membership.group,
                    total = total,
                    in_target_phase = in_target_phase,
                    lagging = ?lagging,
                    "Group not ready"
                );
                ReconcileOutcome::NotReady {
                    group: membership.group.clone(),
                    total: *total,
                    in_target_phase: *in_target_phase,
                }
            }
            GroupVerdict::Ready { .. } => {
                let report = self
                    .applier
                    .apply(&membership.members, &verdict, ctx)
                    .await?;
                if report.written() > 0 {
                    metrics::markers_applied_total().add(
                        report.written() as u64,
                        &[KeyValue::new("namespace", key.namespace.clone())],
                    );
                }
                ReconcileOutcome::Ready {
                    group: membership.group.clone(),
                    written: report.written(),
                    already_marked: report.already_marked,
                }
            }
        };

        Ok(outcome)
    }
}

#[async_trait]
impl<S: MemberStore + 'static> Reconciler for PodGroupReconciler<S> {
    #[instrument(skip(self, ctx), fields(member = %key, reconcile_id = %ctx.reconcile_id()))]
    async fn reconcile(
        &self,
        key: &MemberKey,
        ctx: &ReconcileContext,
    ) -> ReconcileResult<ReconcileOutcome> {
        let started = Instant::now();
        let result = self.reconcile_member(key, ctx).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(outcome) => {
                metrics::reconciles_total()
                    .add(1, &[KeyValue::new("outcome", outcome.label())]);
                log_reconcile!(debug, "COMPLETED",
                    member: key,
                    outcome: outcome.label(),
                    written: outcome.written(),
                    elapsed_ms: elapsed_ms
                );
            }
            Err(error) => {
                metrics::reconcile_errors_total()
                    .add(1, &[KeyValue::new("error_kind", error.error_kind())]);
                log_reconcile!(warn, "FAILED",
                    member: key,
                    error_kind: error.error_kind(),
                    error: error.to_string(),
                    elapsed_ms: elapsed_ms
                );
            }
        }
        metrics::reconcile_duration().record(elapsed_ms, &[]);

        result
    }
}
