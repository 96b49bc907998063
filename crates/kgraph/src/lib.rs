//! kgraph: an ontology-governed knowledge graph.
//!
//! [`KnowledgeGraph`] is the single entry point. Every mutation is checked
//! against the [`Ontology`] before anything else happens, identifiers come
//! from the [`IdentifierRegistry`] and never from the engine, and the
//! physical work is dispatched to whichever [`GraphBackend`] is configured.
//!
//! ```text
//! create_entity:   validate_create   → allocate → backend.create_entity
//! update_entity:   validate_update              → backend.update_entity
//! create_relation: validate_relation            → backend.create_relation
//! ```

pub mod connect;
pub mod error;
pub mod schema;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kgraph_ledger::IdentifierRegistry;
use kgraph_ontology::Ontology;
use kgraph_store::{EntityCursor, GraphBackend};

pub use connect::connect;
pub use error::{KgError, Result};
pub use kgraph_core::{
    property_map, DeleteOutcome, Entity, EntityFilter, PropertyMap, PropertyValue,
    RelationQuery, Relationship, Settings, ValidationError, ValidationRule,
};

/// Default number of records fetched per search round trip.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Outcome of [`KnowledgeGraph::create_entities`].
///
/// Creation stops at the first failure; entities created before it stay.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub created: Vec<Entity>,
    /// Index into the input and the error that stopped the batch.
    pub failed: Option<(usize, KgError)>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }
}

/// The knowledge graph facade.
///
/// Cheap to clone and safe to share between tasks: the ontology is
/// immutable, the registry serialises its own writers and backends are
/// `Send + Sync`.
#[derive(Clone)]
pub struct KnowledgeGraph {
    ontology: Arc<Ontology>,
    registry: Arc<IdentifierRegistry>,
    backend: Arc<dyn GraphBackend>,
    page_size: usize,
}

impl KnowledgeGraph {
    pub fn new(
        ontology: Arc<Ontology>,
        registry: Arc<IdentifierRegistry>,
        backend: Arc<dyn GraphBackend>,
    ) -> Self {
        Self {
            ontology,
            registry,
            backend,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn ontology(&self) -> &Ontology {
        &self.ontology
    }

    pub fn registry(&self) -> &IdentifierRegistry {
        &self.registry
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    // ── Entities ─────────────────────────────────────────────────

    /// Validate, allocate a fresh identifier, then store.
    ///
    /// Nothing is allocated when validation fails. An identifier allocated
    /// before a backend failure stays issued.
    pub async fn create_entity(&self, kind: &str, properties: &PropertyMap) -> Result<Entity> {
        self.check_new_entity(kind, properties).await?;
        let id = self.registry.allocate(kind)?;
        self.store_new_entity(&id, kind, properties).await
    }

    /// Like [`create_entity`](Self::create_entity) with a caller-chosen
    /// identifier, which must never have been issued before.
    pub async fn create_entity_with_id(
        &self,
        id: &str,
        kind: &str,
        properties: &PropertyMap,
    ) -> Result<Entity> {
        self.check_new_entity(kind, properties).await?;
        self.registry.reserve(id, kind)?;
        self.store_new_entity(id, kind, properties).await
    }

    /// Create entities in order, stopping at the first failure.
    pub async fn create_entities<I, K>(&self, items: I) -> BatchReport
    where
        I: IntoIterator<Item = (K, PropertyMap)>,
        K: AsRef<str>,
    {
        let mut report = BatchReport::default();
        for (index, (kind, properties)) in items.into_iter().enumerate() {
            match self.create_entity(kind.as_ref(), &properties).await {
                Ok(entity) => report.created.push(entity),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Batch creation stopped");
                    report.failed = Some((index, e));
                    break;
                }
            }
        }
        report
    }

    pub async fn get_entity(&self, id: &str) -> Result<Entity> {
        Ok(self.backend.get_entity(id).await?)
    }

    /// The entity as it was at `at`: its properties then, with `updated_at`
    /// set to when that state began.
    pub async fn get_entity_at(&self, id: &str, at: DateTime<Utc>) -> Result<Entity> {
        Ok(self.backend.get_entity_at(id, at).await?)
    }

    /// Merge `properties` into an existing entity.
    pub async fn update_entity(&self, id: &str, properties: &PropertyMap) -> Result<Entity> {
        let current = self.backend.get_entity(id).await?;
        self.ontology.validate_update(&current.kind, properties)?;
        self.check_references(&current.kind, properties).await?;

        let entity = self.backend.update_entity(id, properties).await?;
        tracing::debug!(entity_id = id, changed = properties.len(), "Entity updated");
        Ok(entity)
    }

    /// Remove optional properties from an entity.
    pub async fn remove_properties(&self, id: &str, names: &[String]) -> Result<Entity> {
        let current = self.backend.get_entity(id).await?;
        self.ontology.validate_removal(&current.kind, names)?;
        Ok(self.backend.remove_properties(id, names).await?)
    }

    /// Delete an entity. `hard` removes it physically; otherwise it is
    /// stamped deleted and its relationships are closed.
    ///
    /// Deleting an entity twice reports [`DeleteOutcome::AlreadyAbsent`].
    /// An identifier this graph never issued is `NotFound`.
    pub async fn delete_entity(&self, id: &str, hard: bool) -> Result<DeleteOutcome> {
        if !self.registry.is_issued(id) {
            return Err(KgError::NotFound { id: id.to_string() });
        }
        let outcome = self.backend.delete_entity(id, hard).await?;
        tracing::info!(entity_id = id, hard, ?outcome, "Entity deleted");
        Ok(outcome)
    }

    /// Whether the stored entity's kind is `kind` or one of its descendants.
    pub async fn is_a(&self, id: &str, kind: &str) -> Result<bool> {
        self.known_kind(kind)?;
        let entity = self.backend.get_entity(id).await?;
        Ok(self.ontology.is_subkind(&entity.kind, kind))
    }

    // ── Relationships ────────────────────────────────────────────

    pub async fn create_relation(
        &self,
        relation_type: &str,
        source_id: &str,
        target_id: &str,
        properties: &PropertyMap,
    ) -> Result<Relationship> {
        let source = self.backend.get_entity(source_id).await?;
        let target = self.backend.get_entity(target_id).await?;
        self.ontology
            .validate_relation(relation_type, &source.kind, &target.kind, properties)?;

        let relationship = self
            .backend
            .create_relation(relation_type, source_id, target_id, properties)
            .await?;
        tracing::info!(relation_type, source_id, target_id, "Relationship created");
        Ok(relationship)
    }

    pub async fn delete_relation(
        &self,
        relation_type: &str,
        source_id: &str,
        target_id: &str,
    ) -> Result<DeleteOutcome> {
        Ok(self
            .backend
            .delete_relation(relation_type, source_id, target_id)
            .await?)
    }

    pub async fn find_relations(&self, query: &RelationQuery) -> Result<Vec<Relationship>> {
        Ok(self.backend.find_relations(query).await?)
    }

    // ── Search ───────────────────────────────────────────────────

    /// Entities of `kind` or any descendant kind matching `filter`.
    ///
    /// The cursor is lazy, finite and restartable. Filter properties must be
    /// declared for `kind`.
    pub fn search(&self, kind: &str, filter: EntityFilter) -> Result<EntityCursor> {
        self.known_kind(kind)?;
        if let Some(property) = filter
            .properties()
            .find(|p| self.ontology.model().property(kind, p).is_none())
        {
            return Err(ValidationError::UnknownProperty {
                kind: kind.to_string(),
                property: property.to_string(),
            }
            .into());
        }

        let kinds = self.ontology.hierarchy().self_and_descendants(kind);
        tracing::debug!(kind, covered = kinds.len(), "Search started");
        Ok(EntityCursor::new(
            Arc::clone(&self.backend),
            kinds,
            filter,
            self.page_size,
        ))
    }

    // ── Internals ────────────────────────────────────────────────

    fn known_kind(&self, kind: &str) -> Result<()> {
        if self.ontology.is_kind_known(kind) {
            Ok(())
        } else {
            Err(ValidationError::UnknownKind {
                kind: kind.to_string(),
            }
            .into())
        }
    }

    async fn check_new_entity(&self, kind: &str, properties: &PropertyMap) -> Result<()> {
        self.ontology.validate_create(kind, properties)?;
        self.check_references(kind, properties).await
    }

    /// Every relation-valued property must point at a live entity of the
    /// declared kind (or a descendant).
    async fn check_references(&self, kind: &str, properties: &PropertyMap) -> Result<()> {
        for reference in self.ontology.references(kind, properties) {
            let target = self.backend.get_entity(reference.target_id).await?;
            self.ontology
                .check_reference_target(kind, &reference, &target.kind)?;
        }
        Ok(())
    }

    async fn store_new_entity(
        &self,
        id: &str,
        kind: &str,
        properties: &PropertyMap,
    ) -> Result<Entity> {
        match self.backend.create_entity(id, kind, properties).await {
            Ok(entity) => {
                tracing::info!(entity_id = id, kind, backend = self.backend.name(), "Entity created");
                Ok(entity)
            }
            Err(e) => {
                tracing::warn!(entity_id = id, kind, error = %e, "Backend rejected new entity; identifier stays issued");
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for KnowledgeGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeGraph")
            .field("backend", &self.backend.name())
            .field("kinds", &self.ontology.hierarchy().len())
            .field("issued", &self.registry.issued_count())
            .field("page_size", &self.page_size)
            .finish()
    }
}
