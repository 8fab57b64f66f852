//! # Member Store
//!
//! The narrow contract the reconciler uses to read and write member records,
//! plus an in-memory implementation with a change feed.
//!
//! Implementations must enforce optimistic concurrency: `update` fails with
//! [`StoreError::Conflict`] when the stored resource version differs from the
//! one carried by the submitted member, rather than overwriting.

pub mod manifest;
pub mod memory;
pub mod selector;

use crate::errors::{StoreError, StoreResult};
use crate::models::{Member, MemberKey};
use async_trait::async_trait;

pub use manifest::MemberManifest;
pub use memory::{InMemoryMemberStore, StoreStats};
pub use selector::LabelSelector;

/// Point lookup, label-filtered listing and optimistic update of members
#[async_trait]
pub trait MemberStore: Send + Sync + std::fmt::Debug {
    /// Fetch one member; [`StoreError::NotFound`] when absent
    async fn fetch(&self, key: &MemberKey) -> StoreResult<Member>;

    /// List members of one namespace matching `selector`
    async fn list(&self, namespace: &str, selector: &LabelSelector) -> StoreResult<Vec<Member>>;

    /// Persist `member`, returning the stored record with its new resource version
    async fn update(&self, member: &Member) -> StoreResult<Member>;
}

/// Change notification published by a store's watch feed
#[derive(Debug, Clone, PartialEq)]
pub enum MemberEvent {
    /// The member was created or modified; carries the new state
    Applied(Member),
    /// The member was removed; carries its last known state
    Deleted(Member),
}

impl MemberEvent {
    pub fn member(&self) -> &Member {
        match self {
            Self::Applied(member) | Self::Deleted(member) => member,
        }
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}

/// Convenience used by implementations when a fetch misses
pub(crate) fn not_found(key: &MemberKey) -> StoreError {
    StoreError::NotFound { key: key.clone() }
}
