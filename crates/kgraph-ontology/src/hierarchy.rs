//! Kind hierarchy: a DAG of entity kinds with multiple inheritance.
//!
//! Loaded once from the hierarchy artifact, immutable afterwards. Ancestor
//! lists and descendant sets are precomputed at load so every query is a
//! map lookup.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;

use kgraph_core::ConfigurationError;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize)]
struct HierarchyArtifact {
    #[serde(default)]
    kinds: Vec<String>,
    #[serde(default)]
    edges: Vec<EdgeDecl>,
}

#[derive(Debug, Deserialize)]
struct EdgeDecl {
    parent: String,
    child: String,
}

/// Precomputed view of a single kind.
#[derive(Debug, Clone, Default)]
struct KindNode {
    /// Direct parents in declaration order.
    parents: Vec<String>,
    /// All ancestors, nearest first, excluding the kind itself.
    ancestors: Vec<String>,
    ancestor_set: HashSet<String>,
    /// All descendants, excluding the kind itself.
    descendants: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// The kind hierarchy.
#[derive(Debug, Clone, Default)]
pub struct KindHierarchy {
    /// Kind names in first-mention order.
    order: Vec<String>,
    nodes: HashMap<String, KindNode>,
}

impl KindHierarchy {
    /// Parse a hierarchy artifact (`{"kinds": [..], "edges": [{"parent", "child"}]}`).
    pub fn from_json_str(json: &str) -> Result<Self> {
        let artifact: HierarchyArtifact =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Malformed {
                artifact: "kind hierarchy",
                message: e.to_string(),
            })?;
        Self::build(artifact.kinds, artifact.edges)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|error| ConfigurationError::Io {
            path: path.display().to_string(),
            error,
        })?;
        Self::from_json_str(&json)
    }

    /// Build from kind names and `(parent, child)` pairs. Kinds mentioned
    /// only in edges are implied.
    pub fn from_edges<K, P, C>(
        kinds: impl IntoIterator<Item = K>,
        edges: impl IntoIterator<Item = (P, C)>,
    ) -> Result<Self>
    where
        K: Into<String>,
        P: Into<String>,
        C: Into<String>,
    {
        let kinds = kinds.into_iter().map(Into::into).collect();
        let edges = edges
            .into_iter()
            .map(|(p, c)| EdgeDecl {
                parent: p.into(),
                child: c.into(),
            })
            .collect();
        Self::build(kinds, edges)
    }

    fn build(kinds: Vec<String>, edges: Vec<EdgeDecl>) -> Result<Self> {
        let mut hierarchy = Self::default();

        for kind in kinds {
            hierarchy.declare(kind)?;
        }
        for edge in edges {
            hierarchy.declare(edge.parent.clone())?;
            hierarchy.declare(edge.child.clone())?;
            if edge.parent == edge.child {
                return Err(ConfigurationError::Cycle { kind: edge.child });
            }
            let node = hierarchy.nodes.entry(edge.child).or_default();
            if !node.parents.contains(&edge.parent) {
                node.parents.push(edge.parent);
            }
        }

        hierarchy.check_acyclic()?;
        hierarchy.precompute();

        tracing::debug!(kinds = hierarchy.order.len(), "Kind hierarchy loaded");
        Ok(hierarchy)
    }

    fn declare(&mut self, kind: String) -> Result<()> {
        if !is_identifier(&kind) {
            return Err(ConfigurationError::InvalidName {
                what: "kind",
                name: kind,
            });
        }
        if !self.nodes.contains_key(&kind) {
            self.order.push(kind.clone());
            self.nodes.insert(kind, KindNode::default());
        }
        Ok(())
    }

    /// DFS from every kind along parent links; reaching a kind that is still
    /// in progress means the parent relation loops.
    fn check_acyclic(&self) -> Result<()> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.nodes.len());
        for kind in &self.order {
            self.visit(kind, &mut marks)?;
        }
        Ok(())
    }

    fn visit<'a>(&'a self, kind: &'a str, marks: &mut HashMap<&'a str, Mark>) -> Result<()> {
        match marks.get(kind) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                return Err(ConfigurationError::Cycle {
                    kind: kind.to_string(),
                })
            }
            None => {}
        }
        marks.insert(kind, Mark::InProgress);
        if let Some(node) = self.nodes.get(kind) {
            for parent in &node.parents {
                self.visit(parent, marks)?;
            }
        }
        marks.insert(kind, Mark::Done);
        Ok(())
    }

    fn precompute(&mut self) {
        let mut ancestors: HashMap<String, Vec<String>> = HashMap::with_capacity(self.nodes.len());
        for kind in &self.order {
            ancestors.insert(kind.clone(), self.breadth_first_ancestors(kind));
        }

        for (kind, list) in ancestors {
            for ancestor in &list {
                if let Some(node) = self.nodes.get_mut(ancestor) {
                    node.descendants.insert(kind.clone());
                }
            }
            if let Some(node) = self.nodes.get_mut(&kind) {
                node.ancestor_set = list.iter().cloned().collect();
                node.ancestors = list;
            }
        }
    }

    fn breadth_first_ancestors(&self, kind: &str) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut result = Vec::new();
        let mut queue: VecDeque<&str> = VecDeque::new();

        if let Some(node) = self.nodes.get(kind) {
            queue.extend(node.parents.iter().map(String::as_str));
        }
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            result.push(current.to_string());
            if let Some(node) = self.nodes.get(current) {
                queue.extend(node.parents.iter().map(String::as_str));
            }
        }
        result
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn is_kind_known(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Ancestors nearest-first. Empty for roots and unknown kinds.
    pub fn ancestors_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.ancestors.as_slice())
            .unwrap_or(&[])
    }

    /// True iff `a == b` or `b` is a (possibly indirect) ancestor of `a`.
    pub fn is_subkind(&self, a: &str, b: &str) -> bool {
        a == b
            || self
                .nodes
                .get(a)
                .is_some_and(|n| n.ancestor_set.contains(b))
    }

    /// Every kind below `name`, excluding `name` itself.
    pub fn all_descendants(&self, name: &str) -> BTreeSet<String> {
        self.nodes
            .get(name)
            .map(|n| n.descendants.clone())
            .unwrap_or_default()
    }

    /// `name` followed by all of its descendants.
    pub fn self_and_descendants(&self, name: &str) -> Vec<String> {
        let mut kinds = vec![name.to_string()];
        kinds.extend(self.all_descendants(name));
        kinds
    }

    pub fn parents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.parents.as_slice())
            .unwrap_or(&[])
    }

    /// All kinds in first-mention order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Names usable verbatim as labels, classes and field names in every engine.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> KindHierarchy {
        KindHierarchy::from_json_str(
            r#"{
                "kinds": ["Thing", "Person", "Organization"],
                "edges": [
                    {"parent": "Thing", "child": "Person"},
                    {"parent": "Thing", "child": "Organization"},
                    {"parent": "Person", "child": "Employee"},
                    {"parent": "Person", "child": "Contractor"},
                    {"parent": "Employee", "child": "Manager"},
                    {"parent": "Contractor", "child": "Manager"}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_implied_kinds_are_known() {
        let h = sample();
        assert!(h.is_kind_known("Employee"));
        assert!(h.is_kind_known("Manager"));
        assert!(!h.is_kind_known("Robot"));
        assert_eq!(h.len(), 6);
    }

    #[test]
    fn test_ancestors_are_nearest_first_and_deduplicated() {
        let h = sample();
        assert_eq!(
            h.ancestors_of("Manager"),
            ["Employee", "Contractor", "Person", "Thing"]
        );
        assert!(h.ancestors_of("Thing").is_empty());
        assert!(h.ancestors_of("Robot").is_empty());
    }

    #[test]
    fn test_subkind_is_reflexive_and_transitive() {
        let h = sample();
        assert!(h.is_subkind("Employee", "Employee"));
        assert!(h.is_subkind("Employee", "Person"));
        assert!(h.is_subkind("Manager", "Thing"));
        assert!(!h.is_subkind("Person", "Employee"));
        assert!(!h.is_subkind("Organization", "Person"));
    }

    #[test]
    fn test_descendants_exclude_self() {
        let h = sample();
        let below: Vec<_> = h.all_descendants("Person").into_iter().collect();
        assert_eq!(below, vec!["Contractor", "Employee", "Manager"]);
        assert!(h.all_descendants("Manager").is_empty());
        assert_eq!(h.self_and_descendants("Employee"), vec!["Employee", "Manager"]);
    }

    #[test]
    fn test_cycles_are_rejected() {
        let err = KindHierarchy::from_edges(
            Vec::<String>::new(),
            [("A", "B"), ("B", "C"), ("C", "A")],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::Cycle { .. }));

        let err = KindHierarchy::from_edges(["A"], [("A", "A")]).unwrap_err();
        assert!(matches!(err, ConfigurationError::Cycle { kind } if kind == "A"));
    }

    #[test]
    fn test_malformed_and_invalid_names_are_rejected() {
        assert!(matches!(
            KindHierarchy::from_json_str("{\"kinds\": 3}"),
            Err(ConfigurationError::Malformed { .. })
        ));
        assert!(matches!(
            KindHierarchy::from_edges(["Good", "bad name"], Vec::<(String, String)>::new()),
            Err(ConfigurationError::InvalidName { .. })
        ));
    }

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("Person"));
        assert!(is_identifier("_internal"));
        assert!(is_identifier("works_for2"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("has-dash"));
        assert!(!is_identifier(""));
    }
}
