//! Per-invocation deadline and cancellation.

use crate::errors::{ReconcileError, ReconcileResult};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

/// Carried by every reconcile invocation. Store calls made through
/// [`ReconcileContext::guard`] abort once the deadline passes or the driver
/// signals shutdown.
#[derive(Debug, Clone)]
pub struct ReconcileContext {
    reconcile_id: Uuid,
    deadline: Instant,
    timeout: Duration,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ReconcileContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            reconcile_id: Uuid::new_v4(),
            deadline: Instant::now() + timeout,
            timeout,
            shutdown: None,
        }
    }

    /// Abort in-flight store calls once `shutdown` flips to true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn reconcile_id(&self) -> Uuid {
        self.reconcile_id
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Run `operation` unless the deadline passes or shutdown is signalled first
    pub async fn guard<F, T>(&self, operation: &'static str, future: F) -> ReconcileResult<T>
    where
        F: Future<Output = T>,
    {
        let cancelled = wait_for_shutdown(self.shutdown.clone());

        tokio::select! {
            biased;
            _ = cancelled => Err(ReconcileError::Cancelled { operation }),
            result = tokio::time::timeout_at(self.deadline, future) => {
                result.map_err(|_| ReconcileError::DeadlineExceeded {
                    operation,
                    timeout: self.timeout,
                })
            }
        }
    }
}

/// Resolves when the shutdown flag is true; never resolves without a receiver
/// or once the sender is gone.
async fn wait_for_shutdown(shutdown: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = shutdown else {
        return std::future::pending().await;
    };

    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
