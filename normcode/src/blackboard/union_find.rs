//! Disjoint-set alias chain over concept names, with path compression and
//! union-by-rank.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnionFind {
    parent: HashMap<String, String>,
    rank: HashMap<String, usize>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure(&mut self, name: &str) {
        if !self.parent.contains_key(name) {
            self.parent.insert(name.to_string(), name.to_string());
            self.rank.insert(name.to_string(), 0);
        }
    }

    /// Canonical representative of `name`'s alias set, with path
    /// compression. Names never seen before are their own representative.
    pub fn find(&mut self, name: &str) -> String {
        self.ensure(name);
        let parent_of = self.parent.get(name).cloned().unwrap();
        if parent_of == name {
            return parent_of;
        }
        let root = self.find(&parent_of);
        self.parent.insert(name.to_string(), root.clone());
        root
    }

    /// Register an alias: `secondary` resolves to the same canonical
    /// concept as `primary` for all subsequent lookups on either name.
    pub fn union(&mut self, primary: &str, secondary: &str) {
        let root_a = self.find(primary);
        let root_b = self.find(secondary);
        if root_a == root_b {
            return;
        }
        let rank_a = *self.rank.get(&root_a).unwrap_or(&0);
        let rank_b = *self.rank.get(&root_b).unwrap_or(&0);
        match rank_a.cmp(&rank_b) {
            std::cmp::Ordering::Less => {
                self.parent.insert(root_a, root_b);
            }
            std::cmp::Ordering::Greater => {
                self.parent.insert(root_b, root_a);
            }
            std::cmp::Ordering::Equal => {
                self.parent.insert(root_b.clone(), root_a.clone());
                self.rank.insert(root_a, rank_a + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unaliased_name_resolves_to_itself() {
        let mut uf = UnionFind::new();
        assert_eq!(uf.find("a"), "a");
    }

    #[test]
    fn union_makes_both_names_resolve_identically() {
        let mut uf = UnionFind::new();
        uf.union("a", "b");
        assert_eq!(uf.find("a"), uf.find("b"));
    }

    #[test]
    fn union_is_transitive_across_chains() {
        let mut uf = UnionFind::new();
        uf.union("a", "b");
        uf.union("b", "c");
        assert_eq!(uf.find("a"), uf.find("c"));
    }

    #[test]
    fn repeated_union_of_same_pair_is_idempotent() {
        let mut uf = UnionFind::new();
        uf.union("a", "b");
        let root = uf.find("a");
        uf.union("a", "b");
        assert_eq!(uf.find("a"), root);
    }
}
