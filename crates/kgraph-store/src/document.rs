//! Document-store adapter.
//!
//! Each entity is one document:
//!
//! ```text
//! {
//!   "@id": "Person/3f…", "@type": "Person",
//!   "_created_at": "…", "_updated_at": "…", "_deleted_at": "…"?,
//!   "_history": [{"valid_from": "…", "valid_until": "…", "properties": {…}}],
//!   "_relations": [{"type": "knows", "target": "Person/9a…",
//!                   "properties": {…}, "created_at": "…", "closed_at": "…"?}],
//!   "name": {"type": "string", "value": "Alice"}
//! }
//! ```
//!
//! Outgoing relationships live inside the source document, so every
//! mutation is a read-modify-write replacement. Those are serialised
//! through one writer lock per adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kgraph_core::{
    DeleteOutcome, Entity, EntityFilter, PropertyMap, RelationQuery, Relationship,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::codec::{format_timestamp, now, parse_timestamp, value_from_json, value_to_json};
use crate::history::{history_from_json, retire, state_at, History};
use crate::{GraphBackend, Result, SearchPage, StoreError};

pub const ID: &str = "@id";
pub const TYPE: &str = "@type";
pub const CREATED_AT: &str = "_created_at";
pub const UPDATED_AT: &str = "_updated_at";
pub const DELETED_AT: &str = "_deleted_at";
pub const RELATIONS: &str = "_relations";
pub const HISTORY: &str = "_history";

/// Documents read per request when a mutation has to sweep the whole store.
const SWEEP_PAGE: usize = 500;

/// Primitive operations of a document engine.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get_document(&self, id: &str) -> Result<Option<Value>>;

    /// Insert unless a document with the same `@id` exists. Returns whether
    /// it was inserted.
    async fn insert_document(&self, doc: &Value) -> Result<bool>;

    async fn replace_document(&self, doc: &Value) -> Result<()>;

    async fn delete_document(&self, id: &str) -> Result<bool>;

    /// Documents whose `@type` is one of `types` (every document when
    /// `types` is empty), ordered by `@id`.
    async fn list_documents(&self, types: &[String], skip: usize, count: usize)
        -> Result<Vec<Value>>;
}

/// A relationship embedded in its source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRelation {
    #[serde(rename = "type")]
    relation_type: String,
    target: String,
    #[serde(default)]
    properties: PropertyMap,
    created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    closed_at: Option<String>,
}

impl StoredRelation {
    fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    fn to_relationship(&self, source_id: &str) -> Result<Relationship> {
        Ok(Relationship {
            relation_type: self.relation_type.clone(),
            source_id: source_id.to_string(),
            target_id: self.target.clone(),
            properties: self.properties.clone(),
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

/// Typed view over an entity document.
struct EntityDoc(Map<String, Value>);

impl EntityDoc {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::Serialization(format!(
                "expected a document object, got {other}"
            ))),
        }
    }

    fn new(id: &str, kind: &str, properties: &PropertyMap) -> Result<Self> {
        let stamp = format_timestamp(now());
        let mut map = Map::new();
        map.insert(ID.into(), Value::String(id.to_string()));
        map.insert(TYPE.into(), Value::String(kind.to_string()));
        map.insert(CREATED_AT.into(), Value::String(stamp.clone()));
        map.insert(UPDATED_AT.into(), Value::String(stamp));
        map.insert(RELATIONS.into(), Value::Array(Vec::new()));
        let mut doc = Self(map);
        doc.set_properties(properties)?;
        Ok(doc)
    }

    fn str_field(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    fn id(&self) -> &str {
        self.str_field(ID).unwrap_or_default()
    }

    fn is_deleted(&self) -> bool {
        self.0.get(DELETED_AT).is_some_and(|v| !v.is_null())
    }

    fn set_properties(&mut self, properties: &PropertyMap) -> Result<()> {
        for (name, value) in properties {
            self.0.insert(name.clone(), value_to_json(value)?);
        }
        Ok(())
    }

    fn deleted_at(&self) -> Result<Option<DateTime<Utc>>> {
        self.str_field(DELETED_AT).map(parse_timestamp).transpose()
    }

    fn history(&self) -> Result<History> {
        history_from_json(self.0.get(HISTORY))
    }

    /// Move the current state into the history as of `at`.
    fn retire_current(&mut self, at: DateTime<Utc>) -> Result<()> {
        let mut history = self.history()?;
        retire(&mut history, &self.to_entity()?, at);
        self.0.insert(HISTORY.into(), serde_json::to_value(&history)?);
        self.0
            .insert(UPDATED_AT.into(), Value::String(format_timestamp(at)));
        Ok(())
    }

    fn relations(&self) -> Result<Vec<StoredRelation>> {
        match self.0.get(RELATIONS) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(value) => Ok(serde_json::from_value(value.clone())?),
        }
    }

    fn set_relations(&mut self, relations: &[StoredRelation]) -> Result<()> {
        self.0
            .insert(RELATIONS.into(), serde_json::to_value(relations)?);
        Ok(())
    }

    fn to_entity(&self) -> Result<Entity> {
        let timestamp = |field: &str| {
            self.str_field(field)
                .ok_or_else(|| {
                    StoreError::Serialization(format!("document {} has no {field}", self.id()))
                })
                .and_then(parse_timestamp)
        };

        let mut properties = PropertyMap::new();
        for (field, value) in &self.0 {
            if field.starts_with('@') || field.starts_with('_') {
                continue;
            }
            properties.insert(field.clone(), value_from_json(value.clone())?);
        }

        Ok(Entity {
            id: self.id().to_string(),
            kind: self.str_field(TYPE).unwrap_or_default().to_string(),
            properties,
            created_at: timestamp(CREATED_AT)?,
            updated_at: timestamp(UPDATED_AT)?,
        })
    }

    fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// What happens to relationships pointing at an entity being deleted.
#[derive(Debug, Clone, Copy)]
enum Incoming {
    Close,
    Remove,
}

/// [`GraphBackend`] over any [`DocumentEngine`].
pub struct DocumentAdapter<E> {
    engine: E,
    write_lock: Mutex<()>,
}

impl<E: DocumentEngine> DocumentAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            write_lock: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    async fn document(&self, id: &str) -> Result<Option<EntityDoc>> {
        self.engine
            .get_document(id)
            .await?
            .map(EntityDoc::from_value)
            .transpose()
    }

    async fn live_document(&self, id: &str) -> Result<EntityDoc> {
        match self.document(id).await? {
            Some(doc) if !doc.is_deleted() => Ok(doc),
            _ => Err(StoreError::NotFound { id: id.to_string() }),
        }
    }

    /// Visit every stored document, one page at a time.
    async fn sweep(&self) -> Result<Vec<EntityDoc>> {
        let mut all = Vec::new();
        let mut skip = 0;
        loop {
            let page = self.engine.list_documents(&[], skip, SWEEP_PAGE).await?;
            let fetched = page.len();
            for value in page {
                all.push(EntityDoc::from_value(value)?);
            }
            if fetched < SWEEP_PAGE {
                return Ok(all);
            }
            skip += fetched;
        }
    }

    /// Close or remove relationships in other documents that target `id`.
    /// Caller holds the writer lock.
    async fn rewrite_incoming(&self, id: &str, mode: Incoming) -> Result<usize> {
        let now = format_timestamp(Utc::now());
        let mut touched = 0;
        for mut doc in self.sweep().await? {
            if doc.id() == id {
                continue;
            }
            let mut relations = doc.relations()?;
            let before = relations.clone();
            match mode {
                Incoming::Remove => relations.retain(|r| r.target != id),
                Incoming::Close => {
                    for r in relations.iter_mut().filter(|r| r.target == id && r.is_open()) {
                        r.closed_at = Some(now.clone());
                    }
                }
            }
            let changed = relations.len() != before.len()
                || relations
                    .iter()
                    .zip(&before)
                    .any(|(a, b)| a.closed_at != b.closed_at);
            if changed {
                doc.set_relations(&relations)?;
                self.engine.replace_document(&doc.into_value()).await?;
                touched += 1;
            }
        }
        Ok(touched)
    }
}

impl<E> std::fmt::Debug for DocumentAdapter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentAdapter").finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: DocumentEngine> GraphBackend for DocumentAdapter<E> {
    fn name(&self) -> &'static str {
        self.engine.name()
    }

    async fn create_entity(
        &self,
        id: &str,
        kind: &str,
        properties: &PropertyMap,
    ) -> Result<Entity> {
        let doc = EntityDoc::new(id, kind, properties)?;
        let entity = doc.to_entity()?;

        let _guard = self.write_lock.lock().await;
        if !self.engine.insert_document(&doc.into_value()).await? {
            return Err(StoreError::Conflict { id: id.to_string() });
        }
        tracing::debug!(backend = self.engine.name(), entity_id = id, kind, "Document inserted");
        Ok(entity)
    }

    async fn get_entity(&self, id: &str) -> Result<Entity> {
        self.live_document(id).await?.to_entity()
    }

    async fn get_entity_at(&self, id: &str, at: DateTime<Utc>) -> Result<Entity> {
        let not_found = || StoreError::NotFound { id: id.to_string() };
        let doc = self.document(id).await?.ok_or_else(not_found)?;
        state_at(&doc.to_entity()?, doc.deleted_at()?, &doc.history()?, at).ok_or_else(not_found)
    }

    async fn update_entity(&self, id: &str, properties: &PropertyMap) -> Result<Entity> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.live_document(id).await?;
        doc.retire_current(now())?;
        doc.set_properties(properties)?;
        let entity = doc.to_entity()?;
        self.engine.replace_document(&doc.into_value()).await?;
        Ok(entity)
    }

    async fn remove_properties(&self, id: &str, names: &[String]) -> Result<Entity> {
        let _guard = self.write_lock.lock().await;
        let mut doc = self.live_document(id).await?;
        doc.retire_current(now())?;
        for name in names {
            doc.0.remove(name);
        }
        let entity = doc.to_entity()?;
        self.engine.replace_document(&doc.into_value()).await?;
        Ok(entity)
    }

    async fn delete_entity(&self, id: &str, hard: bool) -> Result<DeleteOutcome> {
        let _guard = self.write_lock.lock().await;
        let Some(mut doc) = self.document(id).await? else {
            return Ok(DeleteOutcome::AlreadyAbsent);
        };

        if doc.is_deleted() {
            if hard {
                self.engine.delete_document(id).await?;
                self.rewrite_incoming(id, Incoming::Remove).await?;
                tracing::debug!(entity_id = id, "Soft-deleted document purged");
            }
            return Ok(DeleteOutcome::AlreadyAbsent);
        }

        if hard {
            self.engine.delete_document(id).await?;
            let touched = self.rewrite_incoming(id, Incoming::Remove).await?;
            tracing::debug!(entity_id = id, referencing = touched, "Document deleted");
        } else {
            let at = now();
            let stamp = format_timestamp(at);
            doc.retire_current(at)?;
            let mut relations = doc.relations()?;
            for r in relations.iter_mut().filter(|r| r.is_open()) {
                r.closed_at = Some(stamp.clone());
            }
            doc.set_relations(&relations)?;
            doc.0.insert(DELETED_AT.into(), Value::String(stamp));
            self.engine.replace_document(&doc.into_value()).await?;
            let touched = self.rewrite_incoming(id, Incoming::Close).await?;
            tracing::debug!(entity_id = id, referencing = touched, "Document soft-deleted");
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
        let _guard = self.write_lock.lock().await;
        let mut source = self.live_document(source_id).await?;
        self.live_document(target_id).await?;

        let mut relations = source.relations()?;
        let index = match relations
            .iter()
            .position(|r| r.is_open() && r.relation_type == relation_type && r.target == target_id)
        {
            Some(index) => {
                relations[index].properties.extend(properties.clone());
                index
            }
            None => {
                relations.push(StoredRelation {
                    relation_type: relation_type.to_string(),
                    target: target_id.to_string(),
                    properties: properties.clone(),
                    created_at: format_timestamp(now()),
                    closed_at: None,
                });
                relations.len() - 1
            }
        };
        let relationship = relations[index].to_relationship(source_id)?;

        source.set_relations(&relations)?;
        self.engine.replace_document(&source.into_value()).await?;
        Ok(relationship)
    }

    async fn delete_relation(
        &self,
        relation_type: &str,
        source_id: &str,
        target_id: &str,
    ) -> Result<DeleteOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut source = self.live_document(source_id).await?;
        self.live_document(target_id).await?;

        let mut relations = source.relations()?;
        let before = relations.len();
        relations.retain(|r| !(r.relation_type == relation_type && r.target == target_id));
        if relations.len() == before {
            return Ok(DeleteOutcome::AlreadyAbsent);
        }
        source.set_relations(&relations)?;
        self.engine.replace_document(&source.into_value()).await?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn find_relations(&self, query: &RelationQuery) -> Result<Vec<Relationship>> {
        let sources = match &query.source_id {
            Some(id) => self.document(id).await?.into_iter().collect(),
            None => self.sweep().await?,
        };

        let mut found = Vec::new();
        for doc in sources.iter().filter(|d| !d.is_deleted()) {
            for stored in doc.relations()?.iter().filter(|r| r.is_open()) {
                let relationship = stored.to_relationship(doc.id())?;
                if query.matches(&relationship) {
                    found.push(relationship);
                }
            }
        }
        found.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(found)
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
        let page = self.engine.list_documents(kinds, offset, limit).await?;
        let scanned = page.len();
        let mut entities = Vec::new();
        for value in page {
            let doc = EntityDoc::from_value(value)?;
            if doc.is_deleted() {
                continue;
            }
            let entity = doc.to_entity()?;
            if filter.matches(&entity) {
                entities.push(entity);
            }
        }
        Ok(SearchPage { entities, scanned })
    }
}
