//! # Member Model
//!
//! A member is one schedulable workload unit (a pod). Group membership and the
//! readiness marker are both plain labels; the label keys are supplied by the
//! caller so the model stays independent of configuration.

use super::MemberPhase;
use crate::constants::READY_VALUE;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identity of a member: unique name within a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberKey {
    pub namespace: String,
    pub name: String,
}

impl MemberKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A member record as held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub phase: MemberPhase,
    /// Assigned by the store on every write; updates must carry the version they read
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl Member {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels: BTreeMap::new(),
            phase: MemberPhase::Pending,
            resource_version: 0,
            creation_timestamp: None,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_phase(mut self, phase: MemberPhase) -> Self {
        self.phase = phase;
        self
    }

    pub fn key(&self) -> MemberKey {
        MemberKey::new(&self.namespace, &self.name)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }

    /// Group this member declares through `group_label`.
    ///
    /// An empty value is treated the same as an absent label.
    pub fn group(&self, group_label: &str) -> Option<&str> {
        self.label(group_label).filter(|value| !value.is_empty())
    }

    /// Whether `ready_label` carries exactly the ready value
    pub fn is_marked_ready(&self, ready_label: &str) -> bool {
        self.label(ready_label) == Some(READY_VALUE)
    }

    /// Set the readiness marker in place. Returns false if it was already set.
    pub fn mark_ready(&mut self, ready_label: &str) -> bool {
        if self.is_marked_ready(ready_label) {
            return false;
        }
        self.labels
            .insert(ready_label.to_string(), READY_VALUE.to_string());
        true
    }
}
