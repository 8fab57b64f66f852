//! # Work Queue
//!
//! Deduplicating FIFO of member keys with per-key serialization:
//!
//! - a key already waiting is not queued twice
//! - a key handed to a worker is not handed to another until `done`
//! - a key re-added while in flight is marked dirty and requeued on `done`
//!
//! Delayed re-adds (`add_after`) back the driver's retry backoff.

use crate::models::MemberKey;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<MemberKey>,
    /// Keys that need processing (queued, or re-added while in flight)
    dirty: HashSet<MemberKey>,
    /// Keys currently held by a worker
    processing: HashSet<MemberKey>,
    shutting_down: bool,
}

#[derive(Debug, Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue `key` unless it is already waiting. Returns true if newly queued.
    pub fn add(&self, key: MemberKey) -> bool {
        let mut state = self.state.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return false;
        }

        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            trace!(member = %key, "Key in flight, deferring until done");
            return false;
        }

        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Queue `key` after `delay` elapses
    pub fn add_after(self: &Arc<Self>, key: MemberKey, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<MemberKey> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        // Pass the wakeup on so idle workers drain the backlog
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Release `key` after processing; requeues it if it was re-added meanwhile
    pub fn done(&self, key: &MemberKey) {
        let mut state = self.state.lock();
        state.processing.remove(key);

        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker
    pub fn shutdown(&self) {
        self.state.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Keys waiting to be handed out
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys currently held by workers
    pub fn in_flight(&self) -> usize {
        self.state.lock().processing.len()
    }

    /// No key waiting and none in flight
    pub fn is_idle(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && state.processing.is_empty()
    }
}
