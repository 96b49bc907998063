//! kgraph-ontology: the ontology that governs every kgraph mutation.
//!
//! - [`hierarchy`]: the DAG of entity kinds
//! - [`model`]: inheritance-resolved property definitions and relation rules
//! - [`validate`]: pure checks of proposed entities and relationships

pub mod hierarchy;
pub mod model;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use kgraph_core::ConfigurationError;

pub use hierarchy::{is_identifier, KindHierarchy};
pub use model::{
    Cardinality, DataModel, PropertyDefinition, PropertyTable, RelationRule, ScalarType, ValueKind,
};

pub type Result<T> = std::result::Result<T, ConfigurationError>;

/// Kind hierarchy plus the data model resolved against it.
///
/// Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Ontology {
    hierarchy: Arc<KindHierarchy>,
    model: DataModel,
}

impl Ontology {
    pub fn new(hierarchy: KindHierarchy, model_json: &str) -> Result<Self> {
        let hierarchy = Arc::new(hierarchy);
        let model = DataModel::from_json_str(model_json, Arc::clone(&hierarchy))?;
        Ok(Self { hierarchy, model })
    }

    pub fn from_json_str(hierarchy_json: &str, model_json: &str) -> Result<Self> {
        Self::new(KindHierarchy::from_json_str(hierarchy_json)?, model_json)
    }

    /// Load both artifacts from disk.
    pub fn load(hierarchy_path: impl AsRef<Path>, model_path: impl AsRef<Path>) -> Result<Self> {
        let hierarchy = Arc::new(KindHierarchy::from_path(hierarchy_path)?);
        let model = DataModel::from_path(model_path, Arc::clone(&hierarchy))?;
        tracing::info!(kinds = hierarchy.len(), "Ontology loaded");
        Ok(Self { hierarchy, model })
    }

    pub fn hierarchy(&self) -> &KindHierarchy {
        &self.hierarchy
    }

    pub fn model(&self) -> &DataModel {
        &self.model
    }

    pub fn is_kind_known(&self, kind: &str) -> bool {
        self.hierarchy.is_kind_known(kind)
    }

    pub fn is_subkind(&self, a: &str, b: &str) -> bool {
        self.hierarchy.is_subkind(a, b)
    }

    pub fn relation_allowed(&self, relation_type: &str, source_kind: &str, target_kind: &str) -> bool {
        self.model
            .relation_allowed(relation_type, source_kind, target_kind)
    }
}
