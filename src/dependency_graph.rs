//! Build dependency graph: each unit's direct predecessors
//!
//! Predecessor lists keep insertion order. The critical path resolver
//! breaks ties by the first predecessor it sees, so this order is what
//! makes resolution reproducible.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from unit id to the ids it depends on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyGraph {
    edges: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit with no predecessors (a build root)
    ///
    /// Existing predecessors of `id` are kept.
    pub fn add_unit(&mut self, id: impl Into<String>) {
        self.edges.entry(id.into()).or_default();
    }

    /// Record that `unit` depends on `depends_on`
    ///
    /// Duplicate edges are ignored. `depends_on` is not registered as a
    /// unit by this call.
    pub fn add_dependency(&mut self, unit: impl Into<String>, depends_on: impl Into<String>) {
        let depends_on = depends_on.into();
        let preds = self.edges.entry(unit.into()).or_default();
        if !preds.contains(&depends_on) {
            preds.push(depends_on);
        }
    }

    /// Direct predecessors of `id`, or `None` if the unit is unknown
    pub fn predecessors(&self, id: &str) -> Option<&[String]> {
        self.edges.get(id).map(Vec::as_slice)
    }

    /// Whether `id` is known to the graph
    pub fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// Number of units with an entry in the graph
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// True if no unit has been registered
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Iterate over `(unit, predecessors)` pairs in unit id order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.edges.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K, V, I> FromIterator<(K, I)> for DependencyGraph
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = V>,
{
    fn from_iter<T: IntoIterator<Item = (K, I)>>(iter: T) -> Self {
        let mut graph = Self::new();
        for (unit, preds) in iter {
            let unit = unit.into();
            graph.add_unit(unit.clone());
            for pred in preds {
                graph.add_dependency(unit.clone(), pred);
            }
        }
        graph
    }
}
