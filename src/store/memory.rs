//! # In-Memory Member Store
//!
//! `DashMap`-backed [`MemberStore`] that behaves like a cluster API server for
//! the purposes of this controller: it assigns resource versions, rejects stale
//! updates, and publishes every change on a broadcast watch feed.
//!
//! It also carries test instrumentation: operation counters, an ordered log of
//! successful updates, one-shot fault injection and artificial latency.

use super::{not_found, LabelSelector, MemberEvent, MemberStore};
use crate::errors::{StoreError, StoreResult};
use crate::models::{Member, MemberKey, MemberPhase};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, trace};

const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Snapshot of store operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub fetches: u64,
    pub lists: u64,
    /// Update attempts, including rejected ones
    pub updates: u64,
    /// Events sent on the watch feed
    pub events_published: u64,
}

#[derive(Debug, Default)]
struct FaultPlan {
    fetch: VecDeque<StoreError>,
    list: VecDeque<StoreError>,
    update: HashMap<MemberKey, VecDeque<StoreError>>,
}

#[derive(Debug)]
pub struct InMemoryMemberStore {
    members: DashMap<MemberKey, Member>,
    next_version: AtomicU64,
    events: broadcast::Sender<MemberEvent>,
    faults: Mutex<FaultPlan>,
    latency: Mutex<Option<Duration>>,
    update_log: Mutex<Vec<MemberKey>>,
    fetches: AtomicU64,
    lists: AtomicU64,
    updates: AtomicU64,
    published: AtomicU64,
}

impl Default for InMemoryMemberStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMemberStore {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a store whose watch feed buffers `capacity` events per subscriber
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            members: DashMap::new(),
            next_version: AtomicU64::new(1),
            events,
            faults: Mutex::new(FaultPlan::default()),
            latency: Mutex::new(None),
            update_log: Mutex::new(Vec::new()),
            fetches: AtomicU64::new(0),
            lists: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            published: AtomicU64::new(0),
        }
    }

    /// Subscribe to the watch feed; only events after this call are delivered
    pub fn subscribe(&self) -> broadcast::Receiver<MemberEvent> {
        self.events.subscribe()
    }

    // Admin operations (what kubelets and users do to members)

    /// Create or replace a member regardless of its resource version
    pub fn apply(&self, mut member: Member) -> Member {
        let key = member.key();
        member.resource_version = self.bump_version();
        member.creation_timestamp = self
            .members
            .get(&key)
            .and_then(|existing| existing.creation_timestamp)
            .or(member.creation_timestamp)
            .or_else(|| Some(Utc::now()));

        self.members.insert(key.clone(), member.clone());
        trace!(member = %key, version = member.resource_version, "Member applied");
        self.publish(MemberEvent::Applied(member.clone()));
        member
    }

    /// Move a member to a new phase
    pub fn set_phase(&self, key: &MemberKey, phase: MemberPhase) -> StoreResult<Member> {
        self.modify(key, |member| member.phase = phase)
    }

    /// Set (or overwrite) one label on a member
    pub fn set_label(&self, key: &MemberKey, label: &str, value: &str) -> StoreResult<Member> {
        self.modify(key, |member| {
            member.labels.insert(label.to_string(), value.to_string());
        })
    }

    /// Remove one label from a member
    pub fn remove_label(&self, key: &MemberKey, label: &str) -> StoreResult<Member> {
        self.modify(key, |member| {
            member.labels.remove(label);
        })
    }

    pub fn delete(&self, key: &MemberKey) -> StoreResult<Member> {
        let (_, member) = self.members.remove(key).ok_or_else(|| not_found(key))?;
        debug!(member = %key, "Member deleted");
        self.publish(MemberEvent::Deleted(member.clone()));
        Ok(member)
    }

    /// Current state of one member, without touching the counters
    pub fn get(&self, key: &MemberKey) -> Option<Member> {
        self.members.get(key).map(|entry| entry.value().clone())
    }

    /// All members sorted by key
    pub fn snapshot(&self) -> Vec<Member> {
        let mut members: Vec<Member> = self
            .members
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        members.sort_by(|a, b| a.key().cmp(&b.key()));
        members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    // Instrumentation

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            fetches: self.fetches.load(Ordering::SeqCst),
            lists: self.lists.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            events_published: self.published.load(Ordering::SeqCst),
        }
    }

    /// Keys of successful `update` calls, in order
    pub fn updated_keys(&self) -> Vec<MemberKey> {
        self.update_log.lock().clone()
    }

    /// Make the next `fetch` fail with `error`
    pub fn fail_next_fetch(&self, error: StoreError) {
        self.faults.lock().fetch.push_back(error);
    }

    /// Make the next `list` fail with `error`
    pub fn fail_next_list(&self, error: StoreError) {
        self.faults.lock().list.push_back(error);
    }

    /// Make the next `update` of `key` fail with `error`
    pub fn fail_next_update(&self, key: &MemberKey, error: StoreError) {
        self.faults
            .lock()
            .update
            .entry(key.clone())
            .or_default()
            .push_back(error);
    }

    /// Delay every trait operation by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    fn modify<F>(&self, key: &MemberKey, change: F) -> StoreResult<Member>
    where
        F: FnOnce(&mut Member),
    {
        let updated = {
            let mut entry = self.members.get_mut(key).ok_or_else(|| not_found(key))?;
            change(entry.value_mut());
            entry.resource_version = self.bump_version();
            entry.value().clone()
        };
        self.publish(MemberEvent::Applied(updated.clone()));
        Ok(updated)
    }

    fn bump_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    fn publish(&self, event: MemberEvent) {
        self.published.fetch_add(1, Ordering::SeqCst);
        // No subscribers is fine; the feed is best-effort like a watch
        let _ = self.events.send(event);
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl MemberStore for InMemoryMemberStore {
    async fn fetch(&self, key: &MemberKey) -> StoreResult<Member> {
        self.simulate_latency().await;
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.faults.lock().fetch.pop_front() {
            return Err(error);
        }

        self.get(key).ok_or_else(|| not_found(key))
    }

    async fn list(&self, namespace: &str, selector: &LabelSelector) -> StoreResult<Vec<Member>> {
        self.simulate_latency().await;
        self.lists.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.faults.lock().list.pop_front() {
            return Err(error);
        }

        let mut members: Vec<Member> = self
            .members
            .iter()
            .filter(|entry| entry.key().namespace == namespace && selector.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        members.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(members)
    }

    async fn update(&self, member: &Member) -> StoreResult<Member> {
        self.simulate_latency().await;
        self.updates.fetch_add(1, Ordering::SeqCst);

        let key = member.key();
        let injected = self
            .faults
            .lock()
            .update
            .get_mut(&key)
            .and_then(VecDeque::pop_front);
        if let Some(error) = injected {
            return Err(error);
        }

        let stored = {
            let mut entry = self.members.get_mut(&key).ok_or_else(|| not_found(&key))?;
            if entry.resource_version != member.resource_version {
                return Err(StoreError::Conflict {
                    key,
                    expected: member.resource_version,
                    actual: entry.resource_version,
                });
            }

            let mut next = member.clone();
            next.resource_version = self.bump_version();
            next.creation_timestamp = entry.creation_timestamp;
            *entry.value_mut() = next.clone();
            next
        };

        self.update_log.lock().push(key);
        self.publish(MemberEvent::Applied(stored.clone()));
        Ok(stored)
    }
}
