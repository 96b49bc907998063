//! kgraph-store: backend adapters for the kgraph knowledge graph.
//!
//! Every engine is reached through the [`GraphBackend`] contract, so the
//! facade never sees Cypher, WOQL or document layouts. Two adapters
//! implement it:
//!
//! - [`PropertyGraphAdapter`] over a [`PropertyGraphEngine`] (Neo4j via
//!   [`bolt::BoltClient`], or [`memory::MemoryPropertyGraph`])
//! - [`DocumentAdapter`] over a [`DocumentEngine`] (TerminusDB via
//!   [`terminus::TerminusClient`], or [`memory::MemoryDocumentStore`])

pub mod bolt;
pub mod codec;
pub mod cursor;
pub mod document;
pub mod history;
pub mod memory;
pub mod property_graph;
pub mod terminus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kgraph_core::{DeleteOutcome, Entity, EntityFilter, PropertyMap, RelationQuery, Relationship};

pub use cursor::EntityCursor;
pub use document::{DocumentAdapter, DocumentEngine};
pub use property_graph::{PropertyGraphAdapter, PropertyGraphEngine};

/// Errors from backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{backend} backend unavailable: {message}")]
    Unavailable {
        backend: &'static str,
        message: String,
    },

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("TerminusDB request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TerminusDB rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Entity not found: {id}")]
    NotFound { id: String },

    #[error("Entity already exists: {id}")]
    Conflict { id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Transport-level failures: the engine could not be reached or talked to.
    /// Errors the engine itself reported (bad Cypher, constraint violations,
    /// rejected documents) are not.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Query(e) => matches!(
                e,
                neo4rs::Error::IOError { .. }
                    | neo4rs::Error::ConnectionError
                    | neo4rs::Error::AuthenticationError(_)
            ),
            Self::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// One page of a search.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Entities on this page that satisfy the whole filter, ordered by id.
    pub entities: Vec<Entity>,
    /// Records the engine returned for this page before in-adapter filtering.
    /// A page is the last one when `scanned < limit`.
    pub scanned: usize,
}

/// The contract every backend adapter implements.
///
/// Identifiers are always supplied by the caller; adapters never generate
/// them. Soft-deleted entities are invisible to every operation except a
/// repeated delete.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Short engine name for logs and errors.
    fn name(&self) -> &'static str;

    /// Store a new entity. Fails with `Conflict` if the id is already stored.
    async fn create_entity(&self, id: &str, kind: &str, properties: &PropertyMap)
        -> Result<Entity>;

    async fn get_entity(&self, id: &str) -> Result<Entity>;

    /// The entity as it was at `at`. `NotFound` before it was created, from
    /// its soft deletion onwards, and once it has been hard-deleted.
    async fn get_entity_at(&self, id: &str, at: DateTime<Utc>) -> Result<Entity>;

    /// Merge `properties` into the entity and return its new state.
    async fn update_entity(&self, id: &str, properties: &PropertyMap) -> Result<Entity>;

    async fn remove_properties(&self, id: &str, names: &[String]) -> Result<Entity>;

    /// `hard` removes the entity and its relationships physically; otherwise
    /// the entity is stamped deleted and its relationships are closed.
    async fn delete_entity(&self, id: &str, hard: bool) -> Result<DeleteOutcome>;

    /// Create the relationship, or merge `properties` into an existing one
    /// with the same `(source, type, target)`.
    async fn create_relation(
        &self,
        relation_type: &str,
        source_id: &str,
        target_id: &str,
        properties: &PropertyMap,
    ) -> Result<Relationship>;

    async fn delete_relation(
        &self,
        relation_type: &str,
        source_id: &str,
        target_id: &str,
    ) -> Result<DeleteOutcome>;

    /// Live relationships matching `query`, ordered by (source, type, target).
    async fn find_relations(&self, query: &RelationQuery) -> Result<Vec<Relationship>>;

    /// Scan `limit` records of the given kinds starting at `offset`, in id
    /// order, and keep the live ones matching `filter`. Soft-deleted records
    /// are scanned too, so a soft delete between pages does not shift the
    /// offsets of later records.
    async fn search_page(
        &self,
        kinds: &[String],
        filter: &EntityFilter,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage>;
}
