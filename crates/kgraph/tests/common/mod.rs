//! Shared fixtures: one ontology, a fresh ledger per graph, and both
//! in-memory backends.

#![allow(dead_code)]

use std::sync::Arc;

use kgraph::KnowledgeGraph;
use kgraph_ledger::IdentifierRegistry;
use kgraph_ontology::Ontology;
use kgraph_store::memory::{MemoryDocumentStore, MemoryPropertyGraph};
use kgraph_store::{DocumentAdapter, GraphBackend, PropertyGraphAdapter};
use tempfile::TempDir;

pub const HIERARCHY: &str = r#"{
    "kinds": ["Thing"],
    "edges": [
        {"parent": "Thing", "child": "Person"},
        {"parent": "Thing", "child": "Organization"},
        {"parent": "Person", "child": "Employee"}
    ]
}"#;

pub const DATA_MODEL: &str = r#"{
    "kinds": {
        "Person": {"properties": {
            "name": {"type": "string", "required": true},
            "born": {"type": "date"},
            "nicknames": {"type": "string", "cardinality": "multi"},
            "friend": {"type": {"relation": "Person"}}
        }},
        "Employee": {"properties": {
            "salary": {"type": "float"},
            "mentor": {"type": {"relation": "Employee"}}
        }},
        "Organization": {"properties": {
            "name": {"type": "string", "required": true}
        }}
    },
    "relations": [
        {"relation_type": "works_for", "source": "Employee", "target": "Organization",
         "properties": {"role": {"type": "string"}}},
        {"relation_type": "knows", "source": "Person", "target": "Person"}
    ]
}"#;

pub fn ontology() -> Arc<Ontology> {
    Arc::new(Ontology::from_json_str(HIERARCHY, DATA_MODEL).unwrap())
}

/// A graph plus the directory holding its ledger.
pub struct Fixture {
    pub graph: KnowledgeGraph,
    pub dir: TempDir,
}

pub fn graph_over(backend: Arc<dyn GraphBackend>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(IdentifierRegistry::open(dir.path().join("ids.txt")).unwrap());
    let graph = KnowledgeGraph::new(ontology(), registry, backend).with_page_size(3);
    Fixture { graph, dir }
}

/// One fixture per backend: property graph first, then documents.
pub fn fixtures() -> Vec<Fixture> {
    vec![
        graph_over(Arc::new(PropertyGraphAdapter::new(MemoryPropertyGraph::new()))),
        graph_over(Arc::new(DocumentAdapter::new(MemoryDocumentStore::new()))),
    ]
}
