//! Hierarchical dot-delimited inference addresses, e.g. `1.2.3`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A dot-delimited hierarchical address. Ordering compares components
/// numerically (so `1.2.10` sorts after `1.2.9`, not before), and when one
/// address is a strict prefix of another the longer (deeper) one sorts
/// first — leaves execute before their ancestors within a subtree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowIndex(String);

impl FlowIndex {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn components(&self) -> Vec<u64> {
        self.0.split('.').filter_map(|c| c.parse().ok()).collect()
    }

    /// True iff `self` is `other`, or a descendant of `other` (i.e. `other`
    /// is a strict dot-delimited prefix of `self`).
    pub fn is_descendant_of(&self, other: &FlowIndex) -> bool {
        if self == other {
            return false;
        }
        self.0
            .strip_prefix(other.0.as_str())
            .map(|rest| rest.starts_with('.'))
            .unwrap_or(false)
    }

    /// The immediate parent address, or `None` for a top-level index.
    pub fn parent(&self) -> Option<FlowIndex> {
        self.0.rfind('.').map(|pos| FlowIndex(self.0[..pos].to_string()))
    }

    pub fn depth(&self) -> usize {
        self.0.split('.').count()
    }
}

impl fmt::Display for FlowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FlowIndex {
    fn from(s: &str) -> Self {
        FlowIndex(s.to_string())
    }
}

impl From<String> for FlowIndex {
    fn from(s: String) -> Self {
        FlowIndex(s)
    }
}

impl PartialOrd for FlowIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FlowIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        let a = self.components();
        let b = other.components();
        for (x, y) in a.iter().zip(b.iter()) {
            match x.cmp(y) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        // Shared prefix exhausted: the deeper (longer) index is a
        // descendant and sorts first, so reverse the usual length order.
        b.len().cmp(&a.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_components_compare_correctly() {
        assert!(FlowIndex::new("1.2.2") < FlowIndex::new("1.2.10"));
    }

    #[test]
    fn deeper_descendant_sorts_before_ancestor() {
        assert!(FlowIndex::new("1.2.3") < FlowIndex::new("1.2"));
        assert!(FlowIndex::new("1.2") < FlowIndex::new("1"));
    }

    #[test]
    fn is_descendant_of_requires_dot_boundary() {
        assert!(FlowIndex::new("1.20").is_descendant_of(&FlowIndex::new("1")));
        assert!(!FlowIndex::new("1.20").is_descendant_of(&FlowIndex::new("1.2")));
        assert!(!FlowIndex::new("1").is_descendant_of(&FlowIndex::new("1")));
    }

    #[test]
    fn parent_strips_last_component() {
        assert_eq!(FlowIndex::new("1.2.3").parent(), Some(FlowIndex::new("1.2")));
        assert_eq!(FlowIndex::new("1").parent(), None);
    }

    #[test]
    fn sorting_a_waitlist_puts_leaves_first_within_a_subtree() {
        let mut indices = vec![
            FlowIndex::new("1"),
            FlowIndex::new("1.2"),
            FlowIndex::new("1.1"),
            FlowIndex::new("1.2.1"),
            FlowIndex::new("2"),
        ];
        indices.sort();
        assert_eq!(
            indices,
            vec![
                FlowIndex::new("1.1"),
                FlowIndex::new("1.2.1"),
                FlowIndex::new("1.2"),
                FlowIndex::new("1"),
                FlowIndex::new("2"),
            ]
        );
    }
}
