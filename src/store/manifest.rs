//! YAML member manifests used to seed an [`InMemoryMemberStore`].
//!
//! ```yaml
//! namespace: default
//! members:
//!   - name: p1
//!     phase: Running
//!     labels:
//!       pod-group: job-1
//! ```

use super::InMemoryMemberStore;
use crate::errors::{ControllerError, ControllerResult};
use crate::models::Member;
use serde::{Deserialize, Serialize};
use std::path::Path;

const FALLBACK_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MemberManifest {
    /// Namespace for entries that do not name one
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl MemberManifest {
    pub fn from_yaml(yaml: &str) -> ControllerResult<Self> {
        let mut manifest: MemberManifest = serde_yaml::from_str(yaml)?;
        manifest.normalize()?;
        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> ControllerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Apply every member to `store`, returning the stored records
    pub fn seed(&self, store: &InMemoryMemberStore) -> Vec<Member> {
        self.members
            .iter()
            .cloned()
            .map(|member| store.apply(member))
            .collect()
    }

    fn normalize(&mut self) -> ControllerResult<()> {
        let default_namespace = self
            .namespace
            .clone()
            .unwrap_or_else(|| FALLBACK_NAMESPACE.to_string());

        let mut seen = std::collections::HashSet::new();
        for member in &mut self.members {
            if member.name.trim().is_empty() {
                return Err(ControllerError::Manifest(
                    "every member needs a non-empty name".to_string(),
                ));
            }
            if member.namespace.is_empty() {
                member.namespace = default_namespace.clone();
            }
            if !seen.insert(member.key()) {
                return Err(ControllerError::Manifest(format!(
                    "duplicate member {}",
                    member.key()
                )));
            }
        }
        Ok(())
    }
}
