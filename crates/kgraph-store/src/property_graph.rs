//! Property-graph adapter.
//!
//! Entities are nodes labelled `Entity:<Kind>` carrying `id`, `kind`,
//! `created_at`, `updated_at`, an optional `deleted_at`, and one
//! `p_<name>` field per property holding the tagged JSON of its value.
//! Past property states are kept as JSON in a `history` field.
//! Relationships are typed edges with `created_at`, an optional
//! `closed_at`, and `p_<name>` fields.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kgraph_core::{
    DeleteOutcome, Entity, EntityFilter, PropertyMap, RelationQuery, Relationship,
};

use crate::codec::{
    decode_properties, encode_properties, encode_value, format_timestamp, now, parse_timestamp,
    property_field,
};
use crate::history::{parse_history, retire, state_at, History};
use crate::{GraphBackend, Result, SearchPage, StoreError};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";
pub const DELETED_AT: &str = "deleted_at";
pub const CLOSED_AT: &str = "closed_at";
pub const HISTORY: &str = "history";

/// Node or edge fields. Every stored value is a string.
pub type Fields = BTreeMap<String, String>;

/// A node as stored by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: String,
    pub kind: String,
    pub fields: Fields,
}

impl NodeRecord {
    pub fn is_deleted(&self) -> bool {
        self.fields.contains_key(DELETED_AT)
    }

    fn history(&self) -> Result<History> {
        parse_history(self.fields.get(HISTORY).map(String::as_str))
    }
}

/// An edge as stored by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub rel_type: String,
    pub source_id: String,
    pub target_id: String,
    pub fields: Fields,
}

/// Nodes of some kinds, deleted or not, in id order, optionally constrained
/// by field equality.
#[derive(Debug, Clone, Default)]
pub struct NodeScan {
    pub kinds: Vec<String>,
    pub equals: Vec<(String, String)>,
    pub skip: usize,
    pub limit: usize,
}

/// Live edges; unset fields match anything.
#[derive(Debug, Clone, Default)]
pub struct EdgeScan {
    pub rel_type: Option<String>,
    pub source_id: Option<String>,
    pub target_id: Option<String>,
}

/// Primitive operations of a labelled property-graph engine.
#[async_trait]
pub trait PropertyGraphEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Create the node unless a node with the same id exists (in any state).
    /// Returns whether it was created.
    async fn create_node(&self, node: &NodeRecord) -> Result<bool>;

    /// The node with this id, deleted or not.
    async fn node(&self, id: &str) -> Result<Option<NodeRecord>>;

    /// Set and remove fields. Returns false if the node does not exist.
    async fn set_node_fields(&self, id: &str, set: &Fields, remove: &[String]) -> Result<bool>;

    /// Physically remove the node and every edge touching it.
    async fn delete_node(&self, id: &str) -> Result<bool>;

    /// Create the edge, or set `edge.fields` on the existing one. A
    /// `created_at` field is only written on creation.
    async fn merge_edge(&self, edge: &EdgeRecord) -> Result<bool>;

    /// Set `closed_at` on every live edge touching the node.
    async fn close_edges(&self, node_id: &str, closed_at: &str) -> Result<u64>;

    async fn delete_edge(&self, rel_type: &str, source_id: &str, target_id: &str) -> Result<bool>;

    /// Live (not closed) edges matching the scan.
    async fn edges(&self, scan: &EdgeScan) -> Result<Vec<EdgeRecord>>;

    /// Nodes matching the scan, including soft-deleted ones.
    async fn scan_nodes(&self, scan: &NodeScan) -> Result<Vec<NodeRecord>>;
}

/// [`GraphBackend`] over any [`PropertyGraphEngine`].
#[derive(Debug, Clone)]
pub struct PropertyGraphAdapter<E> {
    engine: E,
}

impl<E: PropertyGraphEngine> PropertyGraphAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    async fn live_node(&self, id: &str) -> Result<NodeRecord> {
        match self.engine.node(id).await? {
            Some(node) if !node.is_deleted() => Ok(node),
            _ => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }
}

fn node_to_entity(node: &NodeRecord) -> Result<Entity> {
    let timestamp = |field: &str| -> Result<_> {
        let text = node.fields.get(field).ok_or_else(|| {
            StoreError::Serialization(format!("node {} has no {field}", node.id))
        })?;
        parse_timestamp(text)
    };
    Ok(Entity {
        id: node.id.clone(),
        kind: node.kind.clone(),
        properties: decode_properties(&node.fields)?,
        created_at: timestamp(CREATED_AT)?,
        updated_at: timestamp(UPDATED_AT)?,
    })
}

/// Fields that retire the node's current state at `at`.
fn retirement(node: &NodeRecord, at: DateTime<Utc>) -> Result<Fields> {
    let mut history = node.history()?;
    retire(&mut history, &node_to_entity(node)?, at);
    let mut set = Fields::new();
    set.insert(HISTORY.to_string(), serde_json::to_string(&history)?);
    set.insert(UPDATED_AT.to_string(), format_timestamp(at));
    Ok(set)
}

fn edge_to_relationship(edge: &EdgeRecord) -> Result<Relationship> {
    let created_at = match edge.fields.get(CREATED_AT) {
        Some(text) => parse_timestamp(text)?,
        None => Utc::now(),
    };
    Ok(Relationship {
        relation_type: edge.rel_type.clone(),
        source_id: edge.source_id.clone(),
        target_id: edge.target_id.clone(),
        properties: decode_properties(&edge.fields)?,
        created_at,
    })
}

#[async_trait]
impl<E: PropertyGraphEngine> GraphBackend for PropertyGraphAdapter<E> {
    fn name(&self) -> &'static str {
        self.engine.name()
    }

    async fn create_entity(
        &self,
        id: &str,
        kind: &str,
        properties: &PropertyMap,
    ) -> Result<Entity> {
        let now = format_timestamp(now());
        let mut fields = encode_properties(properties)?;
        fields.insert(CREATED_AT.to_string(), now.clone());
        fields.insert(UPDATED_AT.to_string(), now);

        let node = NodeRecord {
            id: id.to_string(),
            kind: kind.to_string(),
            fields,
        };
        // Only a node that reads back is stored.
        let entity = node_to_entity(&node)?;
        if !self.engine.create_node(&node).await? {
            return Err(StoreError::Conflict { id: id.to_string() });
        }
        tracing::debug!(backend = self.engine.name(), entity_id = id, kind, "Node created");
        Ok(entity)
    }

    async fn get_entity(&self, id: &str) -> Result<Entity> {
        let node = self.live_node(id).await?;
        node_to_entity(&node)
    }

    async fn get_entity_at(&self, id: &str, at: DateTime<Utc>) -> Result<Entity> {
        let not_found = || StoreError::NotFound { id: id.to_string() };
        let node = self.engine.node(id).await?.ok_or_else(not_found)?;
        let deleted_at = node
            .fields
            .get(DELETED_AT)
            .map(|text| parse_timestamp(text))
            .transpose()?;
        state_at(&node_to_entity(&node)?, deleted_at, &node.history()?, at).ok_or_else(not_found)
    }

    async fn update_entity(&self, id: &str, properties: &PropertyMap) -> Result<Entity> {
        let mut node = self.live_node(id).await?;
        let mut set = encode_properties(properties)?;
        set.extend(retirement(&node, now())?);

        if !self.engine.set_node_fields(id, &set, &[]).await? {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        node.fields.extend(set);
        node_to_entity(&node)
    }

    async fn remove_properties(&self, id: &str, names: &[String]) -> Result<Entity> {
        let mut node = self.live_node(id).await?;
        let remove: Vec<String> = names.iter().map(|n| property_field(n)).collect();
        let set = retirement(&node, now())?;

        if !self.engine.set_node_fields(id, &set, &remove).await? {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        for field in &remove {
            node.fields.remove(field);
        }
        node.fields.extend(set);
        node_to_entity(&node)
    }

    async fn delete_entity(&self, id: &str, hard: bool) -> Result<DeleteOutcome> {
        let Some(node) = self.engine.node(id).await? else {
            return Ok(DeleteOutcome::AlreadyAbsent);
        };

        if node.is_deleted() {
            if hard {
                self.engine.delete_node(id).await?;
                tracing::debug!(entity_id = id, "Soft-deleted node purged");
            }
            return Ok(DeleteOutcome::AlreadyAbsent);
        }

        if hard {
            self.engine.delete_node(id).await?;
        } else {
            let at = now();
            let stamp = format_timestamp(at);
            let mut set = retirement(&node, at)?;
            set.insert(DELETED_AT.to_string(), stamp.clone());
            self.engine.set_node_fields(id, &set, &[]).await?;
            let closed = self.engine.close_edges(id, &stamp).await?;
            tracing::debug!(entity_id = id, closed_edges = closed, "Node soft-deleted");
        }
        Ok(DeleteOutcome::Deleted)
    }

    async fn create_relation(
        &self,
        relation_type: &str,
        source_id: &str,
        target_id: &str,
        properties: &PropertyMap,
    ) -> Result<Relationship> {
        self.live_node(source_id).await?;
        self.live_node(target_id).await?;

        let mut fields = encode_properties(properties)?;
        fields.insert(CREATED_AT.to_string(), format_timestamp(now()));
        let edge = EdgeRecord {
            rel_type: relation_type.to_string(),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            fields,
        };
        if !self.engine.merge_edge(&edge).await? {
            return Err(StoreError::NotFound {
                id: source_id.to_string(),
            });
        }

        let scan = EdgeScan {
            rel_type: Some(relation_type.to_string()),
            source_id: Some(source_id.to_string()),
            target_id: Some(target_id.to_string()),
        };
        let stored = self.engine.edges(&scan).await?;
        match stored.first() {
            Some(edge) => edge_to_relationship(edge),
            None => edge_to_relationship(&edge),
        }
    }

    async fn delete_relation(
        &self,
        relation_type: &str,
        source_id: &str,
        target_id: &str,
    ) -> Result<DeleteOutcome> {
        self.live_node(source_id).await?;
        self.live_node(target_id).await?;
        if self
            .engine
            .delete_edge(relation_type, source_id, target_id)
            .await?
        {
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::AlreadyAbsent)
        }
    }

    async fn find_relations(&self, query: &RelationQuery) -> Result<Vec<Relationship>> {
        let scan = EdgeScan {
            rel_type: query.relation_type.clone(),
            source_id: query.source_id.clone(),
            target_id: query.target_id.clone(),
        };
        let mut relations = self
            .engine
            .edges(&scan)
            .await?
            .iter()
            .map(edge_to_relationship)
            .collect::<Result<Vec<_>>>()?;
        relations.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(relations)
    }

    async fn search_page(
        &self,
        kinds: &[String],
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage> {
        if kinds.is_empty() {
            return Ok(SearchPage::default());
        }
        let equals = filter
            .equalities()
            .map(|(name, value)| Ok((property_field(name), encode_value(value)?)))
            .collect::<Result<Vec<_>>>()?;
        let scan = NodeScan {
            kinds: kinds.to_vec(),
            equals,
            skip: offset,
            limit,
        };

        let nodes = self.engine.scan_nodes(&scan).await?;
        let scanned = nodes.len();
        let mut entities = Vec::with_capacity(scanned);
        for node in nodes.iter().filter(|node| !node.is_deleted()) {
            let entity = node_to_entity(node)?;
            if filter.matches(&entity) {
                entities.push(entity);
            }
        }
        Ok(SearchPage { entities, scanned })
    }
}
