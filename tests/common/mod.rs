//! Shared fixtures for the controller integration tests.

#![allow(dead_code)]

use podgroup_controller::config::ControllerConfig;
use podgroup_controller::models::{Member, MemberKey, MemberPhase};
use podgroup_controller::reconciler::{PodGroupReconciler, ReconcileContext};
use podgroup_controller::store::InMemoryMemberStore;
use std::sync::Arc;
use std::time::Duration;

pub const NS: &str = "default";
pub const GROUP_LABEL: &str = "pod-group";
pub const READY_LABEL: &str = "pod-group-ready";

pub fn key(name: &str) -> MemberKey {
    MemberKey::new(NS, name)
}

/// Builder for test members in the default namespace
pub struct MemberBuilder {
    member: Member,
}

impl MemberBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            member: Member::new(NS, name),
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.member.namespace = namespace.to_string();
        self
    }

    pub fn group(self, group: &str) -> Self {
        Self {
            member: self.member.with_label(GROUP_LABEL, group),
        }
    }

    pub fn phase(self, phase: MemberPhase) -> Self {
        Self {
            member: self.member.with_phase(phase),
        }
    }

    pub fn running(self) -> Self {
        self.phase(MemberPhase::Running)
    }

    pub fn marked(self) -> Self {
        Self {
            member: self.member.with_label(READY_LABEL, "true"),
        }
    }

    pub fn label(self, label: &str, value: &str) -> Self {
        Self {
            member: self.member.with_label(label, value),
        }
    }

    pub fn build(self) -> Member {
        self.member
    }

    pub fn apply(self, store: &InMemoryMemberStore) -> Member {
        store.apply(self.member)
    }
}

pub fn member(name: &str) -> MemberBuilder {
    MemberBuilder::new(name)
}

pub fn reconciler(store: &Arc<InMemoryMemberStore>) -> PodGroupReconciler<InMemoryMemberStore> {
    PodGroupReconciler::new(Arc::clone(store), &ControllerConfig::default().labels)
}

pub fn ctx() -> ReconcileContext {
    ReconcileContext::new(Duration::from_secs(5))
}

pub fn is_marked(store: &InMemoryMemberStore, name: &str) -> bool {
    store
        .get(&key(name))
        .is_some_and(|member| member.is_marked_ready(READY_LABEL))
}

pub fn marked_names(store: &InMemoryMemberStore) -> Vec<String> {
    store
        .snapshot()
        .into_iter()
        .filter(|member| member.is_marked_ready(READY_LABEL))
        .map(|member| member.name)
        .collect()
}

/// Config tuned for fast driver tests: tiny backoff, no resync
pub fn fast_driver_config() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.driver.workers = 2;
    config.driver.resync_enabled = false;
    config.backoff.base_delay_ms = 5;
    config.backoff.max_delay_ms = 50;
    config.backoff.jitter_enabled = false;
    config.reconcile.timeout_ms = 2_000;
    config
}
