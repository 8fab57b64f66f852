//! # Controller Metrics
//!
//! OpenTelemetry instruments for reconcile activity, recorded through the
//! global meter provider. The crate installs no exporter: until the host
//! process registers a meter provider these are no-ops.
//!
//! ```rust
//! use podgroup_controller::metrics;
//! use opentelemetry::KeyValue;
//!
//! metrics::reconciles_total().add(1, &[KeyValue::new("outcome", "ready")]);
//! metrics::reconcile_duration().record(1.5, &[]);
//! ```

use crate::constants::system::METER_NAME;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use std::sync::OnceLock;

static CONTROLLER_METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    CONTROLLER_METER.get_or_init(|| opentelemetry::global::meter(METER_NAME))
}

// Counters

/// Completed reconcile invocations
///
/// Labels:
/// - outcome: member_gone, ungrouped, empty_group, not_ready, ready
pub fn reconciles_total() -> Counter<u64> {
    meter()
        .u64_counter("podgroup.reconciles.total")
        .with_description("Total number of completed reconcile invocations")
        .build()
}

/// Failed reconcile invocations
///
/// Labels:
/// - error_kind: fetch, list, update, update_conflict, deadline_exceeded, cancelled
pub fn reconcile_errors_total() -> Counter<u64> {
    meter()
        .u64_counter("podgroup.reconcile.errors.total")
        .with_description("Total number of reconcile invocations that failed")
        .build()
}

/// Readiness markers written to members
///
/// Labels:
/// - namespace: Member namespace
pub fn markers_applied_total() -> Counter<u64> {
    meter()
        .u64_counter("podgroup.markers.applied.total")
        .with_description("Total number of readiness markers written")
        .build()
}

/// Keys re-enqueued with backoff after a failed reconcile
pub fn requeues_total() -> Counter<u64> {
    meter()
        .u64_counter("podgroup.requeues.total")
        .with_description("Total number of keys requeued with backoff")
        .build()
}

// Histograms

/// Reconcile duration in milliseconds
pub fn reconcile_duration() -> Histogram<f64> {
    meter()
        .f64_histogram("podgroup.reconcile.duration")
        .with_description("Reconcile invocation duration in milliseconds")
        .with_unit("ms")
        .build()
}
