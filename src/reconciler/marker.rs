//! # Marker Applier
//!
//! Writes the readiness label on every member of a ready group that does not
//! carry it yet. Writes are independent: a failure stops the pass but never
//! undoes markers already written, and the next pass skips those members.

use super::{GroupVerdict, ReconcileContext};
use crate::errors::{ReconcileError, ReconcileResult};
use crate::models::{Member, MemberKey};
use crate::store::MemberStore;
use std::sync::Arc;
use tracing::{debug, info};

/// What one applier pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerReport {
    /// Members whose marker was written in this pass, in write order
    pub marked: Vec<MemberKey>,
    /// Members that already carried the marker
    pub already_marked: usize,
}

impl MarkerReport {
    pub fn written(&self) -> usize {
        self.marked.len()
    }
}

#[derive(Debug, Clone)]
pub struct MarkerApplier<S: MemberStore> {
    store: Arc<S>,
    ready_label: String,
}

impl<S: MemberStore> MarkerApplier<S> {
    pub fn new(store: Arc<S>, ready_label: impl Into<String>) -> Self {
        Self {
            store,
            ready_label: ready_label.into(),
        }
    }

    pub fn ready_label(&self) -> &str {
        &self.ready_label
    }

    /// Mark every unmarked member when `verdict` is ready; otherwise do nothing
    pub async fn apply(
        &self,
        members: &[Member],
        verdict: &GroupVerdict,
        ctx: &ReconcileContext,
    ) -> ReconcileResult<MarkerReport> {
        let mut report = MarkerReport::default();
        if !verdict.is_ready() {
            return Ok(report);
        }

        for member in members {
            let mut updated = member.clone();
            if !updated.mark_ready(&self.ready_label) {
                report.already_marked += 1;
                continue;
            }

            let key = member.key();
            ctx.guard("update", self.store.update(&updated))
                .await?
                .map_err(|source| ReconcileError::Update {
                    key: key.clone(),
                    applied: report.written(),
                    source,
                })?;

            debug!(member = %key, label = %self.ready_label, "Readiness marker written");
            report.marked.push(key);
        }

        if report.written() > 0 {
            info!(
                written = report.written(),
                already_marked = report.already_marked,
                label = %self.ready_label,
                "Group marked ready"
            );
        }

        Ok(report)
    }
}
