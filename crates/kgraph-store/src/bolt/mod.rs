//! Neo4j engine over the Bolt protocol.

pub mod client;
mod mutations;
mod queries;

pub use client::{BoltClient, BoltConfig};

use async_trait::async_trait;

use crate::property_graph::{EdgeRecord, EdgeScan, Fields, NodeRecord, NodeScan, PropertyGraphEngine};
use crate::Result;

/// Quote a label, relationship type or property key for Cypher.
pub(crate) fn quote(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `SET var.field = $f0, ...` for `fields`, with the matching parameters.
pub(crate) fn set_clause(var: &str, fields: &Fields) -> (String, Vec<(String, String)>) {
    if fields.is_empty() {
        return (String::new(), Vec::new());
    }
    let mut assignments = Vec::with_capacity(fields.len());
    let mut params = Vec::with_capacity(fields.len());
    for (i, (field, value)) in fields.iter().enumerate() {
        let param = format!("f{i}");
        assignments.push(format!("{var}.{} = ${param}", quote(field)));
        params.push((param, value.clone()));
    }
    (format!("SET {}", assignments.join(", ")), params)
}

#[async_trait]
impl PropertyGraphEngine for BoltClient {
    fn name(&self) -> &'static str {
        "neo4j"
    }

    async fn create_node(&self, node: &NodeRecord) -> Result<bool> {
        self.insert_entity_node(node).await
    }

    async fn node(&self, id: &str) -> Result<Option<NodeRecord>> {
        self.fetch_node(id).await
    }

    async fn set_node_fields(&self, id: &str, set: &Fields, remove: &[String]) -> Result<bool> {
        self.set_fields(id, set, remove).await
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        self.detach_delete(id).await
    }

    async fn merge_edge(&self, edge: &EdgeRecord) -> Result<bool> {
        self.merge_relationship(edge).await
    }

    async fn close_edges(&self, node_id: &str, closed_at: &str) -> Result<u64> {
        self.close_relationships(node_id, closed_at).await
    }

    async fn delete_edge(&self, rel_type: &str, source_id: &str, target_id: &str) -> Result<bool> {
        self.delete_relationship(rel_type, source_id, target_id).await
    }

    async fn edges(&self, scan: &EdgeScan) -> Result<Vec<EdgeRecord>> {
        self.fetch_edges(scan).await
    }

    async fn scan_nodes(&self, scan: &NodeScan) -> Result<Vec<NodeRecord>> {
        self.fetch_nodes(scan).await
    }
}
