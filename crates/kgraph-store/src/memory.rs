//! In-memory engines.
//!
//! Non-persistent, thread-safe stand-ins for Neo4j and TerminusDB. They
//! implement the same engine primitives, so the adapters run unchanged on
//! top of them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::document::{DocumentEngine, ID, TYPE};
use crate::property_graph::{
    EdgeRecord, EdgeScan, Fields, NodeRecord, NodeScan, PropertyGraphEngine, CLOSED_AT,
    CREATED_AT,
};
use crate::{Result, StoreError};

// ============================================================================
// MemoryPropertyGraph
// ============================================================================

/// `(source, type, target)`
type EdgeKey = (String, String, String);

#[derive(Debug, Default)]
struct GraphState {
    nodes: BTreeMap<String, NodeRecord>,
    edges: BTreeMap<EdgeKey, Fields>,
}

/// In-memory labelled property graph.
#[derive(Debug, Default)]
pub struct MemoryPropertyGraph {
    state: RwLock<GraphState>,
}

impl MemoryPropertyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes stored, including soft-deleted ones.
    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }

    /// Edges stored, including closed ones.
    pub async fn edge_count(&self) -> usize {
        self.state.read().await.edges.len()
    }
}

fn edge_record(key: &EdgeKey, fields: &Fields) -> EdgeRecord {
    EdgeRecord {
        source_id: key.0.clone(),
        rel_type: key.1.clone(),
        target_id: key.2.clone(),
        fields: fields.clone(),
    }
}

#[async_trait]
impl PropertyGraphEngine for MemoryPropertyGraph {
    fn name(&self) -> &'static str {
        "memory-graph"
    }

    async fn create_node(&self, node: &NodeRecord) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.nodes.contains_key(&node.id) {
            return Ok(false);
        }
        state.nodes.insert(node.id.clone(), node.clone());
        Ok(true)
    }

    async fn node(&self, id: &str) -> Result<Option<NodeRecord>> {
        Ok(self.state.read().await.nodes.get(id).cloned())
    }

    async fn set_node_fields(&self, id: &str, set: &Fields, remove: &[String]) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(node) = state.nodes.get_mut(id) else {
            return Ok(false);
        };
        for field in remove {
            node.fields.remove(field);
        }
        node.fields
            .extend(set.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(true)
    }

    async fn delete_node(&self, id: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        let existed = state.nodes.remove(id).is_some();
        state
            .edges
            .retain(|(source, _, target), _| source != id && target != id);
        Ok(existed)
    }

    async fn merge_edge(&self, edge: &EdgeRecord) -> Result<bool> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(&edge.source_id) || !state.nodes.contains_key(&edge.target_id)
        {
            return Ok(false);
        }
        let key = (
            edge.source_id.clone(),
            edge.rel_type.clone(),
            edge.target_id.clone(),
        );
        state
            .edges
            .entry(key)
            .and_modify(|fields| {
                for (k, v) in edge.fields.iter().filter(|(k, _)| *k != CREATED_AT) {
                    fields.insert(k.clone(), v.clone());
                }
            })
            .or_insert_with(|| edge.fields.clone());
        Ok(true)
    }

    async fn close_edges(&self, node_id: &str, closed_at: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut closed = 0;
        for ((source, _, target), fields) in state.edges.iter_mut() {
            if (source == node_id || target == node_id) && !fields.contains_key(CLOSED_AT) {
                fields.insert(CLOSED_AT.to_string(), closed_at.to_string());
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn delete_edge(&self, rel_type: &str, source_id: &str, target_id: &str) -> Result<bool> {
        let key = (
            source_id.to_string(),
            rel_type.to_string(),
            target_id.to_string(),
        );
        Ok(self.state.write().await.edges.remove(&key).is_some())
    }

    async fn edges(&self, scan: &EdgeScan) -> Result<Vec<EdgeRecord>> {
        let state = self.state.read().await;
        let fits = |wanted: &Option<String>, actual: &String| {
            wanted.as_ref().map_or(true, |w| w == actual)
        };
        Ok(state
            .edges
            .iter()
            .filter(|(key, fields)| {
                !fields.contains_key(CLOSED_AT)
                    && fits(&scan.source_id, &key.0)
                    && fits(&scan.rel_type, &key.1)
                    && fits(&scan.target_id, &key.2)
            })
            .map(|(key, fields)| edge_record(key, fields))
            .collect())
    }

    async fn scan_nodes(&self, scan: &NodeScan) -> Result<Vec<NodeRecord>> {
        let state = self.state.read().await;
        Ok(state
            .nodes
            .values()
            .filter(|node| scan.kinds.contains(&node.kind))
            .filter(|node| {
                scan.equals
                    .iter()
                    .all(|(field, value)| node.fields.get(field) == Some(value))
            })
            .skip(scan.skip)
            .take(scan.limit)
            .cloned()
            .collect())
    }
}

// ============================================================================
// MemoryDocumentStore
// ============================================================================

/// In-memory JSON document store keyed by `@id`.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<BTreeMap<String, Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn document_count(&self) -> usize {
        self.docs.read().await.len()
    }
}

fn document_id(doc: &Value) -> Result<String> {
    doc.get(ID)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StoreError::Serialization(format!("document without {ID}: {doc}")))
}

#[async_trait]
impl DocumentEngine for MemoryDocumentStore {
    fn name(&self) -> &'static str {
        "memory-documents"
    }

    async fn get_document(&self, id: &str) -> Result<Option<Value>> {
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn insert_document(&self, doc: &Value) -> Result<bool> {
        let id = document_id(doc)?;
        let mut docs = self.docs.write().await;
        if docs.contains_key(&id) {
            return Ok(false);
        }
        docs.insert(id, doc.clone());
        Ok(true)
    }

    async fn replace_document(&self, doc: &Value) -> Result<()> {
        let id = document_id(doc)?;
        self.docs.write().await.insert(id, doc.clone());
        Ok(())
    }

    async fn delete_document(&self, id: &str) -> Result<bool> {
        Ok(self.docs.write().await.remove(id).is_some())
    }

    async fn list_documents(&self, types: &[String], skip: usize, count: usize) -> Result<Vec<Value>> {
        let docs = self.docs.read().await;
        Ok(docs
            .values()
            .filter(|doc| {
                types.is_empty()
                    || doc
                        .get(TYPE)
                        .and_then(Value::as_str)
                        .is_some_and(|t| types.iter().any(|k| k == t))
            })
            .skip(skip)
            .take(count)
            .cloned()
            .collect())
    }
}
