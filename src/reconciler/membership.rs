//! # Membership Resolver
//!
//! Finds every member that currently shares a group label value within one
//! namespace. The result is a snapshot as of the list call; nothing is cached
//! between invocations.

use super::ReconcileContext;
use crate::errors::{ReconcileError, ReconcileResult};
use crate::models::Member;
use crate::store::{LabelSelector, MemberStore};
use std::sync::Arc;
use tracing::debug;

/// Snapshot of one group's members
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMembership {
    pub namespace: String,
    pub group: String,
    pub members: Vec<Member>,
}

impl GroupMembership {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct MembershipResolver<S: MemberStore> {
    store: Arc<S>,
    group_label: String,
}

impl<S: MemberStore> MembershipResolver<S> {
    pub fn new(store: Arc<S>, group_label: impl Into<String>) -> Self {
        Self {
            store,
            group_label: group_label.into(),
        }
    }

    pub fn group_label(&self) -> &str {
        &self.group_label
    }

    /// List the members of `group` in `namespace`.
    ///
    /// An empty group name never reaches the store and resolves to no members.
    pub async fn resolve(
        &self,
        namespace: &str,
        group: &str,
        ctx: &ReconcileContext,
    ) -> ReconcileResult<GroupMembership> {
        if group.is_empty() {
            return Ok(GroupMembership {
                namespace: namespace.to_string(),
                group: String::new(),
                members: Vec::new(),
            });
        }

        let selector = LabelSelector::eq(&self.group_label, group);
        let members = ctx
            .guard("list", self.store.list(namespace, &selector))
            .await?
            .map_err(|source| ReconcileError::List {
                namespace: namespace.to_string(),
                group: group.to_string(),
                source,
            })?;

        debug!(
            namespace = %namespace,
            group = %group,
            selector = %selector,
            member_count = members.len(),
            "Resolved group membership"
        );

        Ok(GroupMembership {
            namespace: namespace.to_string(),
            group: group.to_string(),
            members,
        })
    }
}
