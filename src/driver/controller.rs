//! # Reconcile Driver
//!
//! In-process controller loop around a [`Reconciler`]:
//!
//! - an event pump reads the store's watch feed, applies the [`EventFilter`]
//!   and enqueues member keys
//! - `workers` tasks pull keys from the [`WorkQueue`] (at most one in-flight
//!   reconcile per key) and run the reconciler under a deadline
//! - failed keys are requeued with [`RequeueBackoff`]; failure counts are
//!   forgotten on success
//! - when a member leaves its group, the remaining known members are enqueued
//!   since the departure may have unblocked the group
//! - an optional resync ticker periodically re-enqueues every known grouped
//!   member, covering events lost to a lagging watch feed

use super::{RequeueBackoff, WorkQueue};
use crate::config::ControllerConfig;
use crate::errors::{ControllerError, ControllerResult};
use crate::log_reconcile;
use crate::metrics;
use crate::models::MemberKey;
use crate::reconciler::{EventFilter, ReconcileContext, ReconcileOutcome, Reconciler};
use crate::store::MemberEvent;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Snapshot of driver activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DriverStats {
    pub events_received: u64,
    pub events_filtered: u64,
    /// Events dropped by a lagging watch feed
    pub events_lagged: u64,
    pub reconciles: u64,
    pub successes: u64,
    pub failures: u64,
    pub requeues: u64,
    pub markers_written: u64,
    pub resyncs: u64,
}

#[derive(Debug, Default)]
struct DriverCounters {
    events_received: AtomicU64,
    events_filtered: AtomicU64,
    events_lagged: AtomicU64,
    reconciles: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    requeues: AtomicU64,
    markers_written: AtomicU64,
    resyncs: AtomicU64,
}

impl DriverCounters {
    fn snapshot(&self) -> DriverStats {
        DriverStats {
            events_received: self.events_received.load(Ordering::SeqCst),
            events_filtered: self.events_filtered.load(Ordering::SeqCst),
            events_lagged: self.events_lagged.load(Ordering::SeqCst),
            reconciles: self.reconciles.load(Ordering::SeqCst),
            successes: self.successes.load(Ordering::SeqCst),
            failures: self.failures.load(Ordering::SeqCst),
            requeues: self.requeues.load(Ordering::SeqCst),
            markers_written: self.markers_written.load(Ordering::SeqCst),
            resyncs: self.resyncs.load(Ordering::SeqCst),
        }
    }
}

pub struct ReconcileDriver {
    driver_id: Uuid,
    reconciler: Arc<dyn Reconciler>,
    filter: Arc<dyn EventFilter>,
    queue: Arc<WorkQueue>,
    backoff: RequeueBackoff,
    workers: usize,
    resync_interval: Option<Duration>,
    reconcile_timeout: Duration,
    group_label: String,
    /// Consecutive failure count per key, cleared on success
    failures: DashMap<MemberKey, u32>,
    /// Grouped members seen on the feed, with the group they last declared
    known: DashMap<MemberKey, String>,
    counters: DriverCounters,
}

impl std::fmt::Debug for ReconcileDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileDriver")
            .field("driver_id", &self.driver_id)
            .field("reconciler", &self.reconciler)
            .field("filter", &self.filter)
            .field("workers", &self.workers)
            .field("resync_interval", &self.resync_interval)
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl ReconcileDriver {
    pub fn new(
        reconciler: Arc<dyn Reconciler>,
        filter: Arc<dyn EventFilter>,
        config: &ControllerConfig,
    ) -> Self {
        let driver_id = Uuid::new_v4();
        let resync_interval = config
            .driver
            .resync_enabled
            .then(|| config.driver.resync_interval());

        info!(
            driver_id = %driver_id,
            workers = config.driver.workers,
            reconcile_timeout_ms = config.reconcile.timeout_ms,
            resync_interval_seconds = ?resync_interval.map(|d| d.as_secs()),
            "Creating ReconcileDriver"
        );

        Self {
            driver_id,
            reconciler,
            filter,
            queue: WorkQueue::new(),
            backoff: RequeueBackoff::from_config(&config.backoff),
            workers: config.driver.workers.max(1),
            resync_interval,
            reconcile_timeout: config.reconcile.timeout(),
            group_label: config.labels.group_label.clone(),
            failures: DashMap::new(),
            known: DashMap::new(),
            counters: DriverCounters::default(),
        }
    }

    pub fn driver_id(&self) -> Uuid {
        self.driver_id
    }

    pub fn stats(&self) -> DriverStats {
        self.counters.snapshot()
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Keys currently waiting on a backoff retry
    pub fn pending_retries(&self) -> usize {
        self.failures.len()
    }

    /// Nothing queued, nothing in flight, no retry scheduled
    pub fn is_idle(&self) -> bool {
        self.queue.is_idle() && self.failures.is_empty()
    }

    /// Apply the filter to one watch event and enqueue its key if it passes.
    /// Returns true if the key was enqueued.
    ///
    /// When a member leaves its group (deleted, or group label removed), the
    /// remaining known members of that group are enqueued too: their group
    /// may have just become ready.
    pub fn handle_event(&self, event: &MemberEvent) -> bool {
        self.counters.events_received.fetch_add(1, Ordering::SeqCst);
        let member = event.member();
        let key = member.key();

        if !self.filter.should_enqueue(member) {
            if let Some((_, previous_group)) = self.known.remove(&key) {
                self.enqueue_group(&key.namespace, &previous_group);
            }
            self.counters.events_filtered.fetch_add(1, Ordering::SeqCst);
            debug!(member = %key, "Event filtered out");
            return false;
        }

        if event.is_deleted() {
            let removed = self.known.remove(&key);
            let queued = self.queue.add(key.clone());
            if let Some((_, group)) = removed {
                self.enqueue_group(&key.namespace, &group);
            }
            return queued;
        }

        let group = member
            .group(&self.group_label)
            .unwrap_or_default()
            .to_string();
        if let Some(previous_group) = self.known.insert(key.clone(), group.clone()) {
            if previous_group != group {
                self.enqueue_group(&key.namespace, &previous_group);
            }
        }
        self.queue.add(key)
    }

    /// Enqueue a key directly, bypassing the filter
    pub fn enqueue(&self, key: MemberKey) -> bool {
        self.queue.add(key)
    }

    /// Enqueue every known member of `group` in `namespace`
    fn enqueue_group(&self, namespace: &str, group: &str) -> usize {
        let siblings: Vec<MemberKey> = self
            .known
            .iter()
            .filter(|entry| entry.key().namespace == namespace && entry.value() == group)
            .map(|entry| entry.key().clone())
            .collect();
        let queued = siblings.into_iter().filter(|key| self.queue.add(key.clone())).count();
        debug!(namespace = %namespace, group = %group, queued = queued, "Enqueued group siblings");
        queued
    }

    /// Re-enqueue every known grouped member. Returns how many keys were queued.
    pub fn resync(&self) -> usize {
        self.counters.resyncs.fetch_add(1, Ordering::SeqCst);
        let keys: Vec<MemberKey> = self.known.iter().map(|entry| entry.key().clone()).collect();
        let queued = keys.into_iter().filter(|key| self.queue.add(key.clone())).count();
        debug!(driver_id = %self.driver_id, queued = queued, "Resync enqueued known members");
        queued
    }

    /// Run one reconcile for `key` and schedule a retry on failure
    pub async fn process(&self, key: &MemberKey, shutdown: watch::Receiver<bool>) {
        let ctx = ReconcileContext::new(self.reconcile_timeout).with_shutdown(shutdown);
        self.counters.reconciles.fetch_add(1, Ordering::SeqCst);

        match self.reconciler.reconcile(key, &ctx).await {
            Ok(outcome) => {
                self.counters.successes.fetch_add(1, Ordering::SeqCst);
                self.counters
                    .markers_written
                    .fetch_add(outcome.written() as u64, Ordering::SeqCst);
                self.failures.remove(key);
                if outcome == ReconcileOutcome::MemberGone {
                    self.known.remove(key);
                }
            }
            Err(error) => {
                self.counters.failures.fetch_add(1, Ordering::SeqCst);
                let attempt = {
                    let mut count = self.failures.entry(key.clone()).or_insert(0);
                    *count = count.saturating_add(1);
                    *count
                };
                let delay = self.backoff.delay_for(attempt);

                self.counters.requeues.fetch_add(1, Ordering::SeqCst);
                metrics::requeues_total().add(1, &[]);
                log_reconcile!(warn, "REQUEUED",
                    member: key,
                    attempt: attempt,
                    delay_ms: delay.as_millis(),
                    retryable: error.is_retryable(),
                    error_kind: error.error_kind()
                );
                self.queue.add_after(key.clone(), delay);
            }
        }
    }

    /// Spawn the event pump, workers and resync ticker
    pub fn start(self: Arc<Self>, events: broadcast::Receiver<MemberEvent>) -> DriverHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(self.workers + 2);

        tasks.push(tokio::spawn(
            Arc::clone(&self).run_event_pump(events, shutdown_rx.clone()),
        ));

        for worker_index in 0..self.workers {
            tasks.push(tokio::spawn(
                Arc::clone(&self).run_worker(worker_index, shutdown_rx.clone()),
            ));
        }

        if let Some(interval) = self.resync_interval {
            tasks.push(tokio::spawn(
                Arc::clone(&self).run_resync(interval, shutdown_rx.clone()),
            ));
        }

        log_reconcile!(info, "DRIVER_STARTED",
            driver_id: self.driver_id,
            workers: self.workers
        );

        DriverHandle {
            driver: self,
            shutdown_tx,
            tasks,
        }
    }

    async fn run_event_pump(
        self: Arc<Self>,
        mut events: broadcast::Receiver<MemberEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = events.recv() => match received {
                    Ok(event) => {
                        self.handle_event(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        self.counters.events_lagged.fetch_add(skipped, Ordering::SeqCst);
                        warn!(
                            driver_id = %self.driver_id,
                            skipped = skipped,
                            "Watch feed lagged, resyncing known members"
                        );
                        self.resync();
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!(driver_id = %self.driver_id, "Watch feed closed, stopping event pump");
                        break;
                    }
                },
            }
        }
    }

    async fn run_worker(self: Arc<Self>, worker_index: usize, shutdown: watch::Receiver<bool>) {
        debug!(driver_id = %self.driver_id, worker_index = worker_index, "Worker started");

        while let Some(key) = self.queue.get().await {
            self.process(&key, shutdown.clone()).await;
            self.queue.done(&key);
        }

        debug!(driver_id = %self.driver_id, worker_index = worker_index, "Worker stopped");
    }

    async fn run_resync(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.resync();
                }
            }
        }
    }
}

/// Running driver tasks
#[derive(Debug)]
pub struct DriverHandle {
    driver: Arc<ReconcileDriver>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl DriverHandle {
    pub fn driver(&self) -> &Arc<ReconcileDriver> {
        &self.driver
    }

    pub fn stats(&self) -> DriverStats {
        self.driver.stats()
    }

    /// Wait until the driver has stayed idle for a few consecutive polls.
    /// Returns false if `timeout` elapses first.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        const POLL: Duration = Duration::from_millis(10);
        const STABLE_POLLS: u32 = 3;

        let deadline = tokio::time::Instant::now() + timeout;
        let mut stable = 0;
        while tokio::time::Instant::now() < deadline {
            if self.driver.is_idle() {
                stable += 1;
                if stable >= STABLE_POLLS {
                    return true;
                }
            } else {
                stable = 0;
            }
            tokio::time::sleep(POLL).await;
        }
        false
    }

    /// Wait until the driver has consumed `published()` feed events and then
    /// stayed idle. `published` is re-read on every poll since the driver's
    /// own writes publish events too.
    pub async fn wait_until_settled<F>(&self, published: F, timeout: Duration) -> bool
    where
        F: Fn() -> u64,
    {
        const POLL: Duration = Duration::from_millis(5);

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let stats = self.driver.stats();
            if stats.events_received + stats.events_lagged >= published() {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if self.wait_until_idle(remaining).await {
                    let stats = self.driver.stats();
                    if stats.events_received + stats.events_lagged >= published() {
                        return true;
                    }
                    continue;
                }
                return false;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(POLL).await;
        }
    }

    /// Signal shutdown, cancel in-flight store calls and wait for every task
    pub async fn shutdown(self) -> ControllerResult<DriverStats> {
        let _ = self.shutdown_tx.send(true);
        self.driver.queue.shutdown();

        let mut panicked = 0usize;
        for result in futures::future::join_all(self.tasks).await {
            if let Err(error) = result {
                warn!(error = %error, "Driver task ended abnormally");
                panicked += 1;
            }
        }

        let stats = self.driver.stats();
        log_reconcile!(info, "DRIVER_STOPPED",
            driver_id: self.driver.driver_id,
            reconciles: stats.reconciles,
            markers_written: stats.markers_written
        );

        if panicked > 0 {
            return Err(ControllerError::Driver(format!(
                "{panicked} driver task(s) ended abnormally"
            )));
        }
        Ok(stats)
    }
}
