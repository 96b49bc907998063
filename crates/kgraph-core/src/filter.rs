//! Backend-agnostic entity filters.
//!
//! A filter is a conjunction of per-property conditions. Adapters may push
//! equality conditions down to their engine, but every adapter evaluates the
//! full filter with [`EntityFilter::matches`] before yielding an entity, so
//! the result set never depends on how much the engine could push down.

use crate::types::{Entity, PropertyValue};

/// A single condition on one property.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq(PropertyValue),
    Ne(PropertyValue),
    Exists,
    Missing,
    /// Substring for strings, membership for lists.
    Contains(PropertyValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub property: String,
    pub op: FilterOp,
}

impl Condition {
    pub fn matches(&self, entity: &Entity) -> bool {
        let value = entity.properties.get(&self.property);
        match (&self.op, value) {
            (FilterOp::Eq(expected), Some(v)) => v == expected,
            (FilterOp::Eq(_), None) => false,
            (FilterOp::Ne(expected), Some(v)) => v != expected,
            (FilterOp::Ne(_), None) => true,
            (FilterOp::Exists, v) => v.is_some(),
            (FilterOp::Missing, v) => v.is_none(),
            (FilterOp::Contains(needle), Some(v)) => v.contains(needle),
            (FilterOp::Contains(_), None) => false,
        }
    }
}

/// Conjunction of conditions. The empty filter matches every entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityFilter {
    pub conditions: Vec<Condition>,
}

impl EntityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(self, property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.with(property, FilterOp::Eq(value.into()))
    }

    pub fn ne(self, property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.with(property, FilterOp::Ne(value.into()))
    }

    pub fn exists(self, property: impl Into<String>) -> Self {
        self.with(property, FilterOp::Exists)
    }

    pub fn missing(self, property: impl Into<String>) -> Self {
        self.with(property, FilterOp::Missing)
    }

    pub fn contains(self, property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.with(property, FilterOp::Contains(value.into()))
    }

    fn with(mut self, property: impl Into<String>, op: FilterOp) -> Self {
        self.conditions.push(Condition {
            property: property.into(),
            op,
        });
        self
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.conditions.iter().all(|c| c.matches(entity))
    }

    /// The equality conditions, which engines can evaluate natively.
    pub fn equalities(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.conditions.iter().filter_map(|c| match &c.op {
            FilterOp::Eq(v) => Some((c.property.as_str(), v)),
            _ => None,
        })
    }

    /// Property names referenced by any condition.
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|c| c.property.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::property_map;
    use chrono::Utc;

    fn entity() -> Entity {
        Entity {
            id: "Habit/1".to_string(),
            kind: "Habit".to_string(),
            properties: property_map([("name", "Reading"), ("label", "Good")]),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(EntityFilter::new().matches(&entity()));
    }

    #[test]
    fn test_conditions_are_conjunctive() {
        let e = entity();
        assert!(EntityFilter::new().eq("label", "Good").matches(&e));
        assert!(!EntityFilter::new()
            .eq("label", "Good")
            .eq("name", "Yoga")
            .matches(&e));
        assert!(EntityFilter::new().ne("name", "Yoga").matches(&e));
        assert!(EntityFilter::new().missing("since").matches(&e));
        assert!(EntityFilter::new().contains("name", "ead").matches(&e));
        assert!(!EntityFilter::new().exists("since").matches(&e));
    }

    #[test]
    fn test_ne_matches_absent_property() {
        assert!(EntityFilter::new().ne("since", 2020).matches(&entity()));
    }

    #[test]
    fn test_equalities_skip_other_ops() {
        let f = EntityFilter::new().eq("a", 1).contains("b", "x").eq("c", true);
        let eqs: Vec<_> = f.equalities().map(|(k, _)| k).collect();
        assert_eq!(eqs, vec!["a", "c"]);
    }
}
