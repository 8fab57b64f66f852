use crate::models::Member;
use std::collections::BTreeMap;
use std::fmt;

/// Equality-based label selector (`k1=v1,k2=v2`); every requirement must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    match_labels: BTreeMap<String, String>,
}

impl LabelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Selector with a single `key=value` requirement
    pub fn eq(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new().and_eq(key, value)
    }

    pub fn and_eq(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_labels.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty()
    }

    pub fn matches(&self, member: &Member) -> bool {
        self.match_labels
            .iter()
            .all(|(key, value)| member.label(key) == Some(value.as_str()))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .match_labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        write!(f, "{}", rendered.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = LabelSelector::new();
        assert!(selector.is_empty());
        assert!(selector.matches(&Member::new("default", "p1")));
    }

    #[test]
    fn test_equality_requires_exact_value() {
        let selector = LabelSelector::eq("pod-group", "job-1");
        let same = Member::new("default", "p1").with_label("pod-group", "job-1");
        let other = Member::new("default", "p2").with_label("pod-group", "job-10");
        let none = Member::new("default", "p3");

        assert!(selector.matches(&same));
        assert!(!selector.matches(&other));
        assert!(!selector.matches(&none));
    }

    #[test]
    fn test_all_requirements_must_match() {
        let selector = LabelSelector::eq("pod-group", "job-1").and_eq("tier", "gpu");
        let both = Member::new("default", "p1")
            .with_label("pod-group", "job-1")
            .with_label("tier", "gpu");
        let one = Member::new("default", "p2").with_label("pod-group", "job-1");

        assert!(selector.matches(&both));
        assert!(!selector.matches(&one));
        assert_eq!(selector.to_string(), "pod-group=job-1,tier=gpu");
    }
}
