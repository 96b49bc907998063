//! Write operations against Neo4j.
//!
//! Nodes are identified by their `id` field under the `Entity` label; the
//! kind is a second label. Edges are identified by `(source, type, target)`.

use neo4rs::query;

use crate::bolt::{quote, set_clause};
use crate::property_graph::{EdgeRecord, Fields, NodeRecord, CREATED_AT};
use crate::Result;

use super::client::BoltClient;

impl BoltClient {
    // ── Nodes ────────────────────────────────────────────────────

    /// Create the node unless one with the same id exists.
    pub async fn insert_entity_node(&self, node: &NodeRecord) -> Result<bool> {
        let (set, params) = set_clause("n", &node.fields);
        let cypher = format!(
            "OPTIONAL MATCH (existing:Entity {{id: $id}})
             WITH existing WHERE existing IS NULL
             CREATE (n:Entity:{label} {{id: $id, kind: $kind}})
             {set}
             RETURN count(n) AS cnt",
            label = quote(&node.kind),
        );

        let mut q = query(&cypher)
            .param("id", node.id.clone())
            .param("kind", node.kind.clone());
        for (name, value) in params {
            q = q.param(&name, value);
        }

        Ok(self.query_count(q).await? > 0)
    }

    /// Set and remove fields on a node.
    pub async fn set_fields(&self, id: &str, set: &Fields, remove: &[String]) -> Result<bool> {
        let (set, params) = set_clause("n", set);
        let remove = if remove.is_empty() {
            String::new()
        } else {
            let fields: Vec<String> = remove.iter().map(|f| format!("n.{}", quote(f))).collect();
            format!("REMOVE {}", fields.join(", "))
        };
        let cypher = format!(
            "MATCH (n:Entity {{id: $id}})
             {set}
             {remove}
             RETURN count(n) AS cnt"
        );

        let mut q = query(&cypher).param("id", id.to_string());
        for (name, value) in params {
            q = q.param(&name, value);
        }

        Ok(self.query_count(q).await? > 0)
    }

    /// Delete a node and every relationship touching it.
    pub async fn detach_delete(&self, id: &str) -> Result<bool> {
        let q = query(
            "MATCH (n:Entity {id: $id})
             DETACH DELETE n
             RETURN count(n) AS cnt",
        )
        .param("id", id.to_string());

        Ok(self.query_count(q).await? > 0)
    }

    // ── Edges ────────────────────────────────────────────────────

    /// Upsert an edge between two nodes identified by their ids.
    pub async fn merge_relationship(&self, edge: &EdgeRecord) -> Result<bool> {
        let mut update = edge.fields.clone();
        let created_at = update.remove(CREATED_AT).unwrap_or_default();
        let (set, params) = set_clause("r", &update);

        let cypher = format!(
            "MATCH (a:Entity {{id: $source_id}})
             MATCH (b:Entity {{id: $target_id}})
             MERGE (a)-[r:{rel_type}]->(b)
             ON CREATE SET r.created_at = $created_at
             {set}
             RETURN count(r) AS cnt",
            rel_type = quote(&edge.rel_type),
        );

        let mut q = query(&cypher)
            .param("source_id", edge.source_id.clone())
            .param("target_id", edge.target_id.clone())
            .param("created_at", created_at);
        for (name, value) in params {
            q = q.param(&name, value);
        }

        Ok(self.query_count(q).await? > 0)
    }

    /// Close every live relationship touching a node.
    pub async fn close_relationships(&self, id: &str, closed_at: &str) -> Result<u64> {
        let q = query(
            "MATCH (n:Entity {id: $id})-[r]-(:Entity)
             WHERE r.closed_at IS NULL
             SET r.closed_at = $closed_at
             RETURN count(DISTINCT r) AS cnt",
        )
        .param("id", id.to_string())
        .param("closed_at", closed_at.to_string());

        Ok(self.query_count(q).await?.max(0) as u64)
    }

    pub async fn delete_relationship(
        &self,
        rel_type: &str,
        source_id: &str,
        target_id: &str,
    ) -> Result<bool> {
        let cypher = format!(
            "MATCH (:Entity {{id: $source_id}})-[r:{rel_type}]->(:Entity {{id: $target_id}})
             DELETE r
             RETURN count(r) AS cnt",
            rel_type = quote(rel_type),
        );

        let q = query(&cypher)
            .param("source_id", source_id.to_string())
            .param("target_id", target_id.to_string());

        Ok(self.query_count(q).await? > 0)
    }
}
