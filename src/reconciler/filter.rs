//! Event filters decide which change notifications the driver enqueues at all.

use crate::models::Member;
use std::fmt::Debug;

/// Predicate the driver evaluates before enqueueing a member
pub trait EventFilter: Send + Sync + Debug {
    fn should_enqueue(&self, member: &Member) -> bool;
}

/// Passes only members that declare a non-empty group label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupLabelFilter {
    group_label: String,
}

impl GroupLabelFilter {
    pub fn new(group_label: impl Into<String>) -> Self {
        Self {
            group_label: group_label.into(),
        }
    }
}

impl EventFilter for GroupLabelFilter {
    fn should_enqueue(&self, member: &Member) -> bool {
        member.group(&self.group_label).is_some()
    }
}
