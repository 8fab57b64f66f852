//! # Reconcile Driver
//!
//! Delivers member change notifications to the reconciler one key at a time,
//! serialized per key, with backoff-based retries.

pub mod backoff;
pub mod controller;
pub mod work_queue;

pub use backoff::RequeueBackoff;
pub use controller::{DriverHandle, DriverStats, ReconcileDriver};
pub use work_queue::WorkQueue;
