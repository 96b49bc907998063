//! Core domain types for the kgraph knowledge graph.
//!
//! These types are what callers hand to the facade and what every backend
//! adapter hands back, so they must not carry any engine-specific detail.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ── Property Values ──────────────────────────────────────────────

/// A typed property value.
///
/// The serialized form is tagged (`{"type": "date", "value": "2024-01-31"}`)
/// so that a value read back from any engine has exactly the type it was
/// written with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    /// Identifier of another entity (value of a relation-to-kind property).
    Ref(String),
    /// Values of a multi-cardinality property.
    List(Vec<PropertyValue>),
}

impl PropertyValue {
    /// Build a reference to another entity.
    pub fn reference(id: impl Into<String>) -> Self {
        Self::Ref(id.into())
    }

    /// Short name of the value's type, used in validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Ref(_) => "reference",
            Self::List(_) => "list",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<&str> {
        match self {
            Self::Ref(id) => Some(id),
            _ => None,
        }
    }

    /// All entity identifiers referenced by this value (one for `Ref`, any
    /// number for a list of refs).
    pub fn referenced_ids(&self) -> Vec<&str> {
        match self {
            Self::Ref(id) => vec![id.as_str()],
            Self::List(items) => items.iter().filter_map(Self::as_ref_id).collect(),
            _ => Vec::new(),
        }
    }

    /// Substring match for strings, membership for lists.
    pub fn contains(&self, needle: &PropertyValue) -> bool {
        match (self, needle) {
            (Self::String(hay), Self::String(n)) => hay.contains(n.as_str()),
            (Self::List(items), n) => items.iter().any(|item| item == n),
            _ => false,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s:?}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Ref(id) => write!(f, "@{id}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(value as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<NaiveDate> for PropertyValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::DateTime(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Property name → value. Ordered so that every backend reports properties
/// in the same order.
pub type PropertyMap = BTreeMap<String, PropertyValue>;

/// Build a [`PropertyMap`] from `(name, value)` pairs.
pub fn property_map<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> PropertyMap
where
    K: Into<String>,
    V: Into<PropertyValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

// ── Entities and Relationships ───────────────────────────────────

/// A persisted graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Identifier issued by the identifier registry.
    pub id: String,
    /// Declared kind (the most specific one).
    pub kind: String,
    pub properties: PropertyMap,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

/// A directed, typed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub relation_type: String,
    pub source_id: String,
    pub target_id: String,
    pub properties: PropertyMap,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// The `(source, type, target)` triple that identifies a relationship.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.source_id, &self.relation_type, &self.target_id)
    }
}

/// Result of a delete call. Deleting something already gone is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
}

impl DeleteOutcome {
    pub fn is_already_absent(&self) -> bool {
        matches!(self, Self::AlreadyAbsent)
    }
}

/// Relationship lookup. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationQuery {
    pub relation_type: Option<String>,
    pub source_id: Option<String>,
    pub target_id: Option<String>,
}

impl RelationQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, relation_type: impl Into<String>) -> Self {
        self.relation_type = Some(relation_type.into());
        self
    }

    pub fn from_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn to_target(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn matches(&self, rel: &Relationship) -> bool {
        self.relation_type
            .as_deref()
            .map_or(true, |t| t == rel.relation_type)
            && self
                .source_id
                .as_deref()
                .map_or(true, |s| s == rel.source_id)
            && self
                .target_id
                .as_deref()
                .map_or(true, |t| t == rel.target_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_value_serialization_is_tagged() {
        let date = NaiveDate::from_ymd_opt(1980, 6, 30).unwrap();
        let json = serde_json::to_string(&PropertyValue::Date(date)).unwrap();
        assert_eq!(json, r#"{"type":"date","value":"1980-06-30"}"#);

        let back: PropertyValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PropertyValue::Date(date));
    }

    #[test]
    fn test_ref_and_string_stay_distinct() {
        let r = PropertyValue::reference("Person/1");
        let s = PropertyValue::from("Person/1");
        assert_ne!(r, s);
        assert_eq!(r.referenced_ids(), vec!["Person/1"]);
        assert!(s.referenced_ids().is_empty());
    }

    #[test]
    fn test_contains_matches_substrings_and_members() {
        assert!(PropertyValue::from("Artificial Intelligence").contains(&"Intel".into()));
        let list = PropertyValue::from(vec!["yoga", "reading"]);
        assert!(list.contains(&"yoga".into()));
        assert!(!list.contains(&"yog".into()));
        assert!(!PropertyValue::from(3).contains(&3.into()));
    }

    #[test]
    fn test_relation_query_matches_unset_fields() {
        let rel = Relationship {
            relation_type: "works_for".to_string(),
            source_id: "Employee/1".to_string(),
            target_id: "Organization/1".to_string(),
            properties: PropertyMap::new(),
            created_at: Utc::now(),
        };
        assert!(RelationQuery::new().matches(&rel));
        assert!(RelationQuery::new().of_type("works_for").matches(&rel));
        assert!(!RelationQuery::new().to_target("Organization/2").matches(&rel));
    }
}
