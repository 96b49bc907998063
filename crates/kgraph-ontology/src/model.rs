//! Data model registry: per-kind property definitions and relation rules.
//!
//! Properties are inherited down the kind hierarchy. Inheritance is resolved
//! once at load time, ancestors before descendants, so lookups never walk
//! the hierarchy.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use kgraph_core::{ConfigurationError, PropertyValue};
use serde::Deserialize;

use crate::hierarchy::{is_identifier, KindHierarchy};
use crate::Result;

// ── Artifact Shapes ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ModelArtifact {
    #[serde(default)]
    kinds: BTreeMap<String, KindDecl>,
    #[serde(default)]
    relations: Vec<RelationDecl>,
}

#[derive(Debug, Default, Deserialize)]
struct KindDecl {
    #[serde(default)]
    properties: BTreeMap<String, PropertyDecl>,
}

#[derive(Debug, Deserialize)]
struct PropertyDecl {
    #[serde(rename = "type")]
    value_type: TypeDecl,
    #[serde(default)]
    cardinality: Cardinality,
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TypeDecl {
    Scalar(String),
    Relation { relation: String },
}

#[derive(Debug, Deserialize)]
struct RelationDecl {
    relation_type: String,
    source: String,
    target: String,
    #[serde(default)]
    properties: BTreeMap<String, PropertyDecl>,
}

// ── Definitions ──────────────────────────────────────────────────

/// Scalar value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
}

impl ScalarType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            "date" => Some(Self::Date),
            "datetime" => Some(Self::DateTime),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "datetime",
        }
    }

    /// Exact match only: an integer is not accepted where a float is declared.
    /// Floats must be finite.
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match (self, value) {
            (Self::Float, PropertyValue::Float(x)) => x.is_finite(),
            _ => matches!(
                (self, value),
                (Self::String, PropertyValue::String(_))
                    | (Self::Integer, PropertyValue::Integer(_))
                    | (Self::Boolean, PropertyValue::Boolean(_))
                    | (Self::Date, PropertyValue::Date(_))
                    | (Self::DateTime, PropertyValue::DateTime(_))
            ),
        }
    }
}

/// What a property holds: a scalar, or a reference to an entity of a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Scalar(ScalarType),
    Relation(String),
}

impl ValueKind {
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match self {
            Self::Scalar(scalar) => scalar.accepts(value),
            Self::Relation(_) => matches!(value, PropertyValue::Ref(_)),
        }
    }

    pub fn relation_target(&self) -> Option<&str> {
        match self {
            Self::Relation(kind) => Some(kind),
            Self::Scalar(_) => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => f.write_str(s.name()),
            Self::Relation(kind) => write!(f, "reference to {kind}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Single,
    Multi,
}

/// One declared (or inherited) property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDefinition {
    pub name: String,
    pub value_kind: ValueKind,
    pub cardinality: Cardinality,
    pub required: bool,
    /// Kind whose declaration this definition came from.
    pub declared_by: String,
}

impl PropertyDefinition {
    /// Human-readable type used in validation messages.
    pub fn expected(&self) -> String {
        match self.cardinality {
            Cardinality::Single => self.value_kind.to_string(),
            Cardinality::Multi => format!("list of {}", self.value_kind),
        }
    }
}

/// A permitted relationship between two kinds (and their subkinds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationRule {
    pub relation_type: String,
    pub source: String,
    pub target: String,
    pub properties: BTreeMap<String, PropertyDefinition>,
}

pub type PropertyTable = BTreeMap<String, PropertyDefinition>;

// ── Registry ─────────────────────────────────────────────────────

/// The data model, inheritance-resolved against a [`KindHierarchy`].
#[derive(Debug, Clone)]
pub struct DataModel {
    hierarchy: Arc<KindHierarchy>,
    /// Properties each kind declares itself.
    declared: HashMap<String, PropertyTable>,
    /// Declared plus inherited properties.
    resolved: HashMap<String, PropertyTable>,
    relations: HashMap<String, Vec<RelationRule>>,
}

impl DataModel {
    pub fn from_json_str(json: &str, hierarchy: Arc<KindHierarchy>) -> Result<Self> {
        let artifact: ModelArtifact =
            serde_json::from_str(json).map_err(|e| ConfigurationError::Malformed {
                artifact: "data model",
                message: e.to_string(),
            })?;
        Self::build(artifact, hierarchy)
    }

    pub fn from_path(path: impl AsRef<Path>, hierarchy: Arc<KindHierarchy>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|error| ConfigurationError::Io {
            path: path.display().to_string(),
            error,
        })?;
        Self::from_json_str(&json, hierarchy)
    }

    fn build(artifact: ModelArtifact, hierarchy: Arc<KindHierarchy>) -> Result<Self> {
        let mut declared = HashMap::new();
        for (kind, decl) in artifact.kinds {
            if !hierarchy.is_kind_known(&kind) {
                return Err(ConfigurationError::UnknownKind {
                    kind,
                    context: "the data model".to_string(),
                });
            }
            let mut table = PropertyTable::new();
            for (name, prop) in decl.properties {
                let def = convert(&hierarchy, &kind, name, prop)?;
                table.insert(def.name.clone(), def);
            }
            declared.insert(kind, table);
        }

        let resolved = resolve_inheritance(&hierarchy, &declared)?;

        let mut relations: HashMap<String, Vec<RelationRule>> = HashMap::new();
        let mut rule_count = 0usize;
        for decl in artifact.relations {
            let rule = convert_relation(&hierarchy, decl)?;
            relations
                .entry(rule.relation_type.clone())
                .or_default()
                .push(rule);
            rule_count += 1;
        }

        tracing::debug!(
            kinds = declared.len(),
            relation_rules = rule_count,
            "Data model loaded"
        );

        Ok(Self {
            hierarchy,
            declared,
            resolved,
            relations,
        })
    }

    pub fn hierarchy(&self) -> &KindHierarchy {
        &self.hierarchy
    }

    /// Inheritance-resolved properties of `kind`; `None` if the kind is unknown.
    pub fn properties_of(&self, kind: &str) -> Option<&PropertyTable> {
        self.resolved.get(kind)
    }

    pub fn property(&self, kind: &str, name: &str) -> Option<&PropertyDefinition> {
        self.resolved.get(kind).and_then(|t| t.get(name))
    }

    /// Properties `kind` declares itself (empty for kinds without an entry).
    pub fn declared_properties(&self, kind: &str) -> impl Iterator<Item = &PropertyDefinition> {
        self.declared.get(kind).into_iter().flat_map(|t| t.values())
    }

    /// Whether `relation_type` is permitted from `source_kind` to `target_kind`.
    pub fn relation_allowed(&self, relation_type: &str, source_kind: &str, target_kind: &str) -> bool {
        self.relation_rule(relation_type, source_kind, target_kind)
            .is_some()
    }

    /// The first rule (in declaration order) permitting the relation.
    pub fn relation_rule(
        &self,
        relation_type: &str,
        source_kind: &str,
        target_kind: &str,
    ) -> Option<&RelationRule> {
        self.matching_relation_rules(relation_type, source_kind, target_kind)
            .next()
    }

    /// Every rule permitting the relation, in declaration order.
    pub fn matching_relation_rules<'a, 'k>(
        &'a self,
        relation_type: &str,
        source_kind: &'k str,
        target_kind: &'k str,
    ) -> impl Iterator<Item = &'a RelationRule> + 'k
    where
        'a: 'k,
    {
        self.relations
            .get(relation_type)
            .into_iter()
            .flatten()
            .filter(move |rule| {
                self.hierarchy.is_subkind(source_kind, &rule.source)
                    && self.hierarchy.is_subkind(target_kind, &rule.target)
            })
    }

    pub fn relation_rules(&self) -> impl Iterator<Item = &RelationRule> {
        self.relations.values().flatten()
    }
}

fn convert(
    hierarchy: &KindHierarchy,
    kind: &str,
    name: String,
    decl: PropertyDecl,
) -> Result<PropertyDefinition> {
    if !is_identifier(&name) || name.starts_with('_') {
        return Err(ConfigurationError::InvalidName {
            what: "property",
            name,
        });
    }
    let value_kind = match decl.value_type {
        TypeDecl::Scalar(type_name) => match ScalarType::parse(&type_name) {
            Some(scalar) => ValueKind::Scalar(scalar),
            None => {
                return Err(ConfigurationError::UnknownValueType {
                    kind: kind.to_string(),
                    property: name,
                    value_type: type_name,
                })
            }
        },
        TypeDecl::Relation { relation } => {
            if !hierarchy.is_kind_known(&relation) {
                return Err(ConfigurationError::UnknownKind {
                    kind: relation,
                    context: format!("property '{name}' of kind '{kind}'"),
                });
            }
            ValueKind::Relation(relation)
        }
    };
    Ok(PropertyDefinition {
        name,
        value_kind,
        cardinality: decl.cardinality,
        required: decl.required,
        declared_by: kind.to_string(),
    })
}

fn convert_relation(hierarchy: &KindHierarchy, decl: RelationDecl) -> Result<RelationRule> {
    if !is_identifier(&decl.relation_type) {
        return Err(ConfigurationError::InvalidName {
            what: "relation type",
            name: decl.relation_type,
        });
    }
    for endpoint in [&decl.source, &decl.target] {
        if !hierarchy.is_kind_known(endpoint) {
            return Err(ConfigurationError::UnknownKind {
                kind: endpoint.clone(),
                context: format!("relation '{}'", decl.relation_type),
            });
        }
    }

    let mut properties = BTreeMap::new();
    for (name, prop) in decl.properties {
        let def = convert(hierarchy, &decl.relation_type, name, prop)?;
        if def.value_kind.relation_target().is_some() {
            return Err(ConfigurationError::IncompatibleProperty {
                kind: decl.relation_type,
                property: def.name,
                reason: "relationship properties must be scalar".to_string(),
            });
        }
        properties.insert(def.name.clone(), def);
    }

    Ok(RelationRule {
        relation_type: decl.relation_type,
        source: decl.source,
        target: decl.target,
        properties,
    })
}

/// Resolve every kind's property table, ancestors first.
///
/// A kind always has strictly more ancestors than any of its parents, so
/// ordering by ancestor count is a topological order.
fn resolve_inheritance(
    hierarchy: &KindHierarchy,
    declared: &HashMap<String, PropertyTable>,
) -> Result<HashMap<String, PropertyTable>> {
    let mut order: Vec<&str> = hierarchy.kinds().collect();
    order.sort_by_key(|k| hierarchy.ancestors_of(k).len());

    let mut resolved: HashMap<String, PropertyTable> = HashMap::with_capacity(order.len());
    for kind in order {
        let mut table = PropertyTable::new();

        for parent in hierarchy.parents_of(kind) {
            let Some(inherited) = resolved.get(parent) else {
                continue;
            };
            for (name, def) in inherited {
                match table.get(name) {
                    None => {
                        table.insert(name.clone(), def.clone());
                    }
                    Some(existing) => {
                        let merged = merge_parents(hierarchy, kind, existing, def)?;
                        table.insert(name.clone(), merged);
                    }
                }
            }
        }

        if let Some(own) = declared.get(kind) {
            for (name, def) in own {
                if let Some(inherited) = table.get(name) {
                    check_override(hierarchy, kind, inherited, def)?;
                }
                table.insert(name.clone(), def.clone());
            }
        }

        resolved.insert(kind.to_string(), table);
    }
    Ok(resolved)
}

/// A descendant may narrow a relation target but never change the scalar
/// type or the cardinality.
fn check_override(
    hierarchy: &KindHierarchy,
    kind: &str,
    inherited: &PropertyDefinition,
    own: &PropertyDefinition,
) -> Result<()> {
    let compatible = inherited.cardinality == own.cardinality
        && match (&inherited.value_kind, &own.value_kind) {
            (ValueKind::Scalar(a), ValueKind::Scalar(b)) => a == b,
            (ValueKind::Relation(base), ValueKind::Relation(narrow)) => {
                hierarchy.is_subkind(narrow, base)
            }
            _ => false,
        };
    if compatible {
        Ok(())
    } else {
        Err(ConfigurationError::IncompatibleProperty {
            kind: kind.to_string(),
            property: own.name.clone(),
            reason: format!(
                "declared as {} but inherited from '{}' as {}",
                own.expected(),
                inherited.declared_by,
                inherited.expected()
            ),
        })
    }
}

/// Same property reaching a kind through two parents.
fn merge_parents(
    hierarchy: &KindHierarchy,
    kind: &str,
    a: &PropertyDefinition,
    b: &PropertyDefinition,
) -> Result<PropertyDefinition> {
    let value_kind = if a.cardinality != b.cardinality {
        None
    } else {
        match (&a.value_kind, &b.value_kind) {
            (ValueKind::Scalar(x), ValueKind::Scalar(y)) if x == y => Some(a.value_kind.clone()),
            (ValueKind::Relation(x), ValueKind::Relation(y)) => {
                if hierarchy.is_subkind(x, y) {
                    Some(a.value_kind.clone())
                } else if hierarchy.is_subkind(y, x) {
                    Some(b.value_kind.clone())
                } else {
                    None
                }
            }
            _ => None,
        }
    };

    let Some(value_kind) = value_kind else {
        return Err(ConfigurationError::IncompatibleProperty {
            kind: kind.to_string(),
            property: a.name.clone(),
            reason: format!(
                "inherited as {} from '{}' and as {} from '{}'",
                a.expected(),
                a.declared_by,
                b.expected(),
                b.declared_by
            ),
        });
    };

    let declared_by = if value_kind == a.value_kind {
        a.declared_by.clone()
    } else {
        b.declared_by.clone()
    };
    Ok(PropertyDefinition {
        name: a.name.clone(),
        value_kind,
        cardinality: a.cardinality,
        required: a.required || b.required,
        declared_by,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> Arc<KindHierarchy> {
        Arc::new(
            KindHierarchy::from_edges(
                ["Thing"],
                [
                    ("Thing", "Person"),
                    ("Thing", "Organization"),
                    ("Organization", "Company"),
                    ("Person", "Employee"),
                    ("Person", "Volunteer"),
                    ("Employee", "StaffVolunteer"),
                    ("Volunteer", "StaffVolunteer"),
                ],
            )
            .unwrap(),
        )
    }

    fn model(json: &str) -> Result<DataModel> {
        DataModel::from_json_str(json, hierarchy())
    }

    const BASE: &str = r#"{
        "kinds": {
            "Person": {"properties": {
                "name": {"type": "string", "required": true},
                "nicknames": {"type": "string", "cardinality": "multi"}
            }},
            "Employee": {"properties": {
                "employer": {"type": {"relation": "Organization"}, "required": true},
                "salary": {"type": "float"}
            }}
        },
        "relations": [
            {"relation_type": "works_for", "source": "Employee", "target": "Organization",
             "properties": {"since": {"type": "date"}}}
        ]
    }"#;

    #[test]
    fn test_properties_are_inherited() {
        let m = model(BASE).unwrap();
        let emp = m.properties_of("Employee").unwrap();
        assert!(emp["name"].required);
        assert_eq!(emp["name"].declared_by, "Person");
        assert_eq!(emp["nicknames"].cardinality, Cardinality::Multi);
        assert_eq!(
            emp["employer"].value_kind,
            ValueKind::Relation("Organization".to_string())
        );

        let staff = m.properties_of("StaffVolunteer").unwrap();
        assert!(staff.contains_key("salary"));
        assert!(staff["name"].required);

        assert!(m.properties_of("Thing").unwrap().is_empty());
        assert!(m.properties_of("Robot").is_none());
    }

    #[test]
    fn test_relation_rules_respect_subkinds() {
        let m = model(BASE).unwrap();
        assert!(m.relation_allowed("works_for", "Employee", "Organization"));
        assert!(m.relation_allowed("works_for", "StaffVolunteer", "Company"));
        assert!(!m.relation_allowed("works_for", "Person", "Organization"));
        assert!(!m.relation_allowed("works_for", "Employee", "Person"));
        assert!(!m.relation_allowed("knows", "Person", "Person"));

        let rule = m.relation_rule("works_for", "Employee", "Company").unwrap();
        assert!(rule.properties.contains_key("since"));
    }

    #[test]
    fn test_compatible_override_narrows_relation_target() {
        let json = r#"{"kinds": {
            "Employee": {"properties": {"employer": {"type": {"relation": "Organization"}, "required": true}}},
            "StaffVolunteer": {"properties": {"employer": {"type": {"relation": "Company"}}}}
        }}"#;
        let m = model(json).unwrap();
        let def = m.property("StaffVolunteer", "employer").unwrap();
        assert_eq!(def.value_kind, ValueKind::Relation("Company".to_string()));
        assert!(!def.required);
        assert_eq!(def.declared_by, "StaffVolunteer");
    }

    #[test]
    fn test_incompatible_override_fails() {
        let json = r#"{"kinds": {
            "Person": {"properties": {"age": {"type": "integer"}}},
            "Employee": {"properties": {"age": {"type": "float"}}}
        }}"#;
        assert!(matches!(
            model(json),
            Err(ConfigurationError::IncompatibleProperty { kind, property, .. })
                if kind == "Employee" && property == "age"
        ));

        let json = r#"{"kinds": {
            "Person": {"properties": {"tags": {"type": "string", "cardinality": "multi"}}},
            "Employee": {"properties": {"tags": {"type": "string"}}}
        }}"#;
        assert!(matches!(
            model(json),
            Err(ConfigurationError::IncompatibleProperty { .. })
        ));
    }

    #[test]
    fn test_diamond_inheritance_merges_compatible_definitions() {
        let json = r#"{"kinds": {
            "Employee": {"properties": {
                "badge": {"type": "string", "required": true},
                "org": {"type": {"relation": "Organization"}}
            }},
            "Volunteer": {"properties": {
                "badge": {"type": "string"},
                "org": {"type": {"relation": "Company"}}
            }}
        }}"#;
        let m = model(json).unwrap();
        let staff = m.properties_of("StaffVolunteer").unwrap();
        assert!(staff["badge"].required);
        assert_eq!(
            staff["org"].value_kind,
            ValueKind::Relation("Company".to_string())
        );
    }

    #[test]
    fn test_diamond_inheritance_rejects_conflicts() {
        let json = r#"{"kinds": {
            "Employee": {"properties": {"badge": {"type": "string"}}},
            "Volunteer": {"properties": {"badge": {"type": "integer"}}}
        }}"#;
        assert!(matches!(
            model(json),
            Err(ConfigurationError::IncompatibleProperty { kind, .. }) if kind == "StaffVolunteer"
        ));
    }

    #[test]
    fn test_unknown_references_fail_the_load() {
        let unknown_kind = r#"{"kinds": {"Robot": {"properties": {}}}}"#;
        assert!(matches!(
            model(unknown_kind),
            Err(ConfigurationError::UnknownKind { kind, .. }) if kind == "Robot"
        ));

        let unknown_target = r#"{"kinds": {"Person": {"properties": {
            "pet": {"type": {"relation": "Animal"}}
        }}}}"#;
        assert!(matches!(
            model(unknown_target),
            Err(ConfigurationError::UnknownKind { kind, .. }) if kind == "Animal"
        ));

        let unknown_type = r#"{"kinds": {"Person": {"properties": {
            "age": {"type": "decimal"}
        }}}}"#;
        assert!(matches!(
            model(unknown_type),
            Err(ConfigurationError::UnknownValueType { value_type, .. }) if value_type == "decimal"
        ));

        let unknown_relation_kind = r#"{"relations": [
            {"relation_type": "owns", "source": "Person", "target": "Car"}
        ]}"#;
        assert!(matches!(
            model(unknown_relation_kind),
            Err(ConfigurationError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_reserved_property_names_are_rejected() {
        let json = r#"{"kinds": {"Person": {"properties": {"_deleted": {"type": "boolean"}}}}}"#;
        assert!(matches!(
            model(json),
            Err(ConfigurationError::InvalidName { what: "property", .. })
        ));
    }

    /// Every required property of a kind stays required on each descendant
    /// unless the descendant redeclares it.
    #[test]
    fn test_required_properties_are_monotonic() {
        let m = model(BASE).unwrap();
        let h = m.hierarchy();
        for kind in h.kinds() {
            let table = m.properties_of(kind).unwrap();
            for descendant in h.all_descendants(kind) {
                let below = m.properties_of(&descendant).unwrap();
                for (name, def) in table.iter().filter(|(_, d)| d.required) {
                    let inherited = &below[name];
                    let overridden = m
                        .declared_properties(&descendant)
                        .any(|d| d.name == *name);
                    assert!(inherited.required || overridden, "{descendant}.{name} from {}", def.declared_by);
                }
            }
        }
    }
}
