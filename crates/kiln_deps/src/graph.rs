//! Dependency graph with reverse reachability queries.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::hash::Hash;

/// A directed dependency graph keyed by an arbitrary item type.
///
/// An edge from `a` to `b` means `a` reads `b`: when `b` changes, `a` must
/// be rebuilt. Out-edges are stored per item and replaced wholesale on each
/// [`set_dependencies`](Self::set_dependencies) call, so stale edges from a
/// previous scan never linger. The graph serializes as part of persisted
/// build state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyGraph<K: Eq + Hash + Ord + Clone> {
    edges: HashMap<K, BTreeSet<K>>,
}

impl<K: Eq + Hash + Ord + Clone> DependencyGraph<K> {
    /// Creates a new empty graph.
    pub fn new() -> Self {
        Self {
            edges: HashMap::new(),
        }
    }

    /// Records the complete set of items `item` reads, replacing any
    /// previously recorded dependencies. Self-references are dropped.
    pub fn set_dependencies(&mut self, item: K, deps: impl IntoIterator<Item = K>) {
        let deps: BTreeSet<K> = deps.into_iter().filter(|dep| *dep != item).collect();
        self.edges.insert(item, deps);
    }

    /// Returns the recorded dependencies of `item`, if it has been scanned.
    pub fn dependencies_of(&self, item: &K) -> Option<&BTreeSet<K>> {
        self.edges.get(item)
    }

    /// Removes `item` and its out-edges.
    ///
    /// Edges from other items pointing at `item` are kept, so a deleted file
    /// still flags everything that read it.
    pub fn remove(&mut self, item: &K) {
        self.edges.remove(item);
    }

    /// Removes all items and edges.
    pub fn clear(&mut self) {
        self.edges.clear();
    }

    /// Returns the number of items with recorded dependencies.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if no dependencies have been recorded.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Returns every item that transitively depends on any of `changed`,
    /// sorted for deterministic output.
    ///
    /// The items in `changed` themselves are not included, even when they
    /// participate in a dependency cycle.
    pub fn dependents_of(&self, changed: &[K]) -> Vec<K> {
        if self.edges.is_empty() || changed.is_empty() {
            return Vec::new();
        }

        // Reverse adjacency: dependency -> items that read it
        let mut reverse: HashMap<&K, Vec<&K>> = HashMap::new();
        for (item, deps) in &self.edges {
            for dep in deps {
                reverse.entry(dep).or_default().push(item);
            }
        }

        let mut visited: HashSet<&K> = changed.iter().collect();
        let mut queue: VecDeque<&K> = changed.iter().collect();
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = reverse.get(current) {
                for &dependent in dependents {
                    if visited.insert(dependent) {
                        result.push(dependent.clone());
                        queue.push_back(dependent);
                    }
                }
            }
        }

        result.sort();
        result
    }
}

impl<K: Eq + Hash + Ord + Clone> Default for DependencyGraph<K> {
    fn default() -> Self {
        Self::new()
    }
}
