//! # Readiness Evaluator
//!
//! Pure decision over a group's member phases: ready only if the group is
//! non-empty and every member is in the target phase. Order never matters.

use crate::models::{Member, MemberPhase};
use serde::Serialize;

/// Outcome of evaluating one membership snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum GroupVerdict {
    /// No members: never marked
    Empty,
    /// At least one member is not in the target phase
    NotReady {
        total: usize,
        in_target_phase: usize,
        /// Names of members holding the group back
        lagging: Vec<String>,
    },
    /// Every member is in the target phase
    Ready { total: usize },
}

impl GroupVerdict {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessEvaluator {
    target_phase: MemberPhase,
}

impl Default for ReadinessEvaluator {
    fn default() -> Self {
        Self::new(MemberPhase::Running)
    }
}

impl ReadinessEvaluator {
    pub fn new(target_phase: MemberPhase) -> Self {
        Self { target_phase }
    }

    pub fn target_phase(&self) -> MemberPhase {
        self.target_phase
    }

    pub fn evaluate(&self, members: &[Member]) -> GroupVerdict {
        if members.is_empty() {
            return GroupVerdict::Empty;
        }

        let lagging: Vec<String> = members
            .iter()
            .filter(|member| member.phase != self.target_phase)
            .map(|member| member.name.clone())
            .collect();

        if lagging.is_empty() {
            GroupVerdict::Ready {
                total: members.len(),
            }
        } else {
            GroupVerdict::NotReady {
                total: members.len(),
                in_target_phase: members.len() - lagging.len(),
                lagging,
            }
        }
    }
}
