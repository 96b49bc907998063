//! Read operations against Neo4j.

use neo4rs::query;

use crate::bolt::quote;
use crate::property_graph::{EdgeRecord, EdgeScan, Fields, NodeRecord, NodeScan};
use crate::{Result, StoreError};

use super::client::BoltClient;

/// Node columns: the two identifying fields plus every stored field.
const NODE_COLUMNS: &str = "n.id AS id, n.kind AS kind,
     keys(n) AS keys, [k IN keys(n) | toString(n[k])] AS vals";

impl BoltClient {
    /// The node with this id, deleted or not.
    pub async fn fetch_node(&self, id: &str) -> Result<Option<NodeRecord>> {
        let cypher = format!(
            "MATCH (n:Entity {{id: $id}})
             RETURN {NODE_COLUMNS}"
        );
        let q = query(&cypher).param("id", id.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(row_to_node(&row)?)),
            None => Ok(None),
        }
    }

    /// Nodes of the scanned kinds, soft-deleted ones included, in id order.
    pub async fn fetch_nodes(&self, scan: &NodeScan) -> Result<Vec<NodeRecord>> {
        let mut conditions = vec!["n.kind IN $kinds".to_string()];
        for (i, (field, _)) in scan.equals.iter().enumerate() {
            conditions.push(format!("n.{} = $eq{i}", quote(field)));
        }
        let cypher = format!(
            "MATCH (n:Entity)
             WHERE {}
             RETURN {NODE_COLUMNS}
             ORDER BY n.id
             SKIP $skip LIMIT $limit",
            conditions.join(" AND ")
        );

        let mut q = query(&cypher)
            .param("kinds", scan.kinds.clone())
            .param("skip", scan.skip as i64)
            .param("limit", scan.limit as i64);
        for (i, (_, value)) in scan.equals.iter().enumerate() {
            q = q.param(&format!("eq{i}"), value.clone());
        }

        let rows = self.query_rows(q).await?;
        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            nodes.push(row_to_node(&row)?);
        }
        Ok(nodes)
    }

    /// Live relationships matching the scan.
    pub async fn fetch_edges(&self, scan: &EdgeScan) -> Result<Vec<EdgeRecord>> {
        let pattern = match &scan.rel_type {
            Some(rel_type) => format!("[r:{}]", quote(rel_type)),
            None => "[r]".to_string(),
        };
        let mut conditions = vec!["r.closed_at IS NULL".to_string()];
        if scan.source_id.is_some() {
            conditions.push("a.id = $source_id".to_string());
        }
        if scan.target_id.is_some() {
            conditions.push("b.id = $target_id".to_string());
        }
        let cypher = format!(
            "MATCH (a:Entity)-{pattern}->(b:Entity)
             WHERE {}
             RETURN a.id AS source, type(r) AS rel_type, b.id AS target,
                    keys(r) AS keys, [k IN keys(r) | toString(r[k])] AS vals
             ORDER BY source, rel_type, target",
            conditions.join(" AND ")
        );

        let mut q = query(&cypher);
        if let Some(source_id) = &scan.source_id {
            q = q.param("source_id", source_id.clone());
        }
        if let Some(target_id) = &scan.target_id {
            q = q.param("target_id", target_id.clone());
        }

        let rows = self.query_rows(q).await?;
        let mut edges = Vec::with_capacity(rows.len());
        for row in rows {
            edges.push(EdgeRecord {
                source_id: column(&row, "source")?,
                rel_type: column(&row, "rel_type")?,
                target_id: column(&row, "target")?,
                fields: row_fields(&row, &[])?,
            });
        }
        Ok(edges)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn column(row: &neo4rs::Row, name: &str) -> Result<String> {
    row.get::<String>(name)
        .map_err(|e| StoreError::Serialization(format!("Failed to read column {name}: {e}")))
}

/// Zip the `keys`/`vals` columns into fields, leaving out `skip`.
fn row_fields(row: &neo4rs::Row, skip: &[&str]) -> Result<Fields> {
    let keys: Vec<String> = row.get("keys").unwrap_or_default();
    let vals: Vec<String> = row.get("vals").unwrap_or_default();
    if keys.len() != vals.len() {
        return Err(StoreError::Serialization(format!(
            "{} keys but {} values",
            keys.len(),
            vals.len()
        )));
    }
    Ok(keys
        .into_iter()
        .zip(vals)
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .collect())
}

fn row_to_node(row: &neo4rs::Row) -> Result<NodeRecord> {
    Ok(NodeRecord {
        id: column(row, "id")?,
        kind: column(row, "kind")?,
        fields: row_fields(row, &["id", "kind"])?,
    })
}
