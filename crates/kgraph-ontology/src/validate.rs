//! Validation engine.
//!
//! Checks run in a fixed order and stop at the first failure:
//! 1. the kind exists
//! 2. every supplied property is declared (directly or inherited)
//! 3. on create, every required property is present
//! 4. every value matches its declared value kind and cardinality
//!
//! Relationships additionally require a permitting relation rule, whose
//! declared properties then go through steps 2-4. Nothing here mutates state.

use kgraph_core::{PropertyMap, PropertyValue, ValidationError};

use crate::model::{Cardinality, PropertyDefinition, PropertyTable};
use crate::Ontology;

type Outcome = std::result::Result<(), ValidationError>;

/// A relation-valued property whose target must be resolved by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    pub property: &'a str,
    pub target_id: &'a str,
    /// Declared target kind; the referenced entity must be a subkind of it.
    pub target_kind: &'a str,
}

impl Ontology {
    pub fn validate_create(&self, kind: &str, properties: &PropertyMap) -> Outcome {
        let table = self.table(kind)?;
        check_properties(kind, table, properties, true)
    }

    /// Updates carry only the changed properties, so required ones may be absent.
    pub fn validate_update(&self, kind: &str, changed: &PropertyMap) -> Outcome {
        let table = self.table(kind)?;
        check_properties(kind, table, changed, false)
    }

    /// Removing a property is allowed only for declared, optional ones.
    pub fn validate_removal(&self, kind: &str, names: &[String]) -> Outcome {
        let table = self.table(kind)?;
        for name in names {
            match table.get(name) {
                None => {
                    return Err(ValidationError::UnknownProperty {
                        kind: kind.to_string(),
                        property: name.clone(),
                    })
                }
                Some(def) if def.required => {
                    return Err(ValidationError::MissingRequiredProperty {
                        kind: kind.to_string(),
                        property: name.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    pub fn validate_relation(
        &self,
        relation_type: &str,
        source_kind: &str,
        target_kind: &str,
        properties: &PropertyMap,
    ) -> Outcome {
        for kind in [source_kind, target_kind] {
            if !self.is_kind_known(kind) {
                return Err(ValidationError::UnknownKind {
                    kind: kind.to_string(),
                });
            }
        }
        // Accepted if any permitting rule accepts the properties; otherwise
        // the first rule's complaint is reported.
        let mut first_failure = None;
        for rule in self
            .model
            .matching_relation_rules(relation_type, source_kind, target_kind)
        {
            match check_properties(relation_type, &rule.properties, properties, true) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    first_failure.get_or_insert(e);
                }
            }
        }
        Err(first_failure.unwrap_or_else(|| ValidationError::DisallowedRelation {
            relation_type: relation_type.to_string(),
            source_kind: source_kind.to_string(),
            target_kind: target_kind.to_string(),
        }))
    }

    /// Relation-valued properties among `properties`, one entry per referenced id.
    pub fn references<'a>(&'a self, kind: &str, properties: &'a PropertyMap) -> Vec<Reference<'a>> {
        let Some(table) = self.model.properties_of(kind) else {
            return Vec::new();
        };
        let mut refs = Vec::new();
        for (name, value) in properties {
            let Some(target_kind) = table
                .get(name)
                .and_then(|def| def.value_kind.relation_target())
            else {
                continue;
            };
            for target_id in value.referenced_ids() {
                refs.push(Reference {
                    property: name,
                    target_id,
                    target_kind,
                });
            }
        }
        refs
    }

    /// The entity a reference points at must be of the declared target kind.
    pub fn check_reference_target(&self, kind: &str, reference: &Reference<'_>, actual_kind: &str) -> Outcome {
        if self.is_subkind(actual_kind, reference.target_kind) {
            Ok(())
        } else {
            Err(ValidationError::TypeMismatch {
                kind: kind.to_string(),
                property: reference.property.to_string(),
                expected: format!("reference to {}", reference.target_kind),
                found: format!("reference to {actual_kind}"),
            })
        }
    }

    fn table(&self, kind: &str) -> std::result::Result<&PropertyTable, ValidationError> {
        self.model
            .properties_of(kind)
            .ok_or_else(|| ValidationError::UnknownKind {
                kind: kind.to_string(),
            })
    }
}

fn check_properties(owner: &str, table: &PropertyTable, properties: &PropertyMap, require_all: bool) -> Outcome {
    if let Some(name) = properties.keys().find(|name| !table.contains_key(*name)) {
        return Err(ValidationError::UnknownProperty {
            kind: owner.to_string(),
            property: name.clone(),
        });
    }

    if require_all {
        if let Some(def) = table
            .values()
            .find(|def| def.required && !properties.contains_key(&def.name))
        {
            return Err(ValidationError::MissingRequiredProperty {
                kind: owner.to_string(),
                property: def.name.clone(),
            });
        }
    }

    for (name, value) in properties {
        if let Some(def) = table.get(name) {
            check_value(owner, def, value)?;
        }
    }
    Ok(())
}

fn check_value(owner: &str, def: &PropertyDefinition, value: &PropertyValue) -> Outcome {
    let accepted = match (def.cardinality, value) {
        (Cardinality::Multi, PropertyValue::List(items)) => {
            items.iter().all(|item| def.value_kind.accepts(item))
        }
        (Cardinality::Multi, _) | (Cardinality::Single, PropertyValue::List(_)) => false,
        (Cardinality::Single, scalar) => def.value_kind.accepts(scalar),
    };
    if accepted {
        return Ok(());
    }
    Err(ValidationError::TypeMismatch {
        kind: owner.to_string(),
        property: def.name.clone(),
        expected: def.expected(),
        found: describe(value),
    })
}

fn describe(value: &PropertyValue) -> String {
    match value {
        PropertyValue::List(items) => {
            let mut types: Vec<&str> = items.iter().map(PropertyValue::type_name).collect();
            types.dedup();
            if types.is_empty() {
                "empty list".to_string()
            } else {
                format!("list of {}", types.join("/"))
            }
        }
        PropertyValue::Float(x) if !x.is_finite() => format!("non-finite float {x}"),
        other => other.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kgraph_core::{property_map, ValidationRule};

    fn ontology() -> Ontology {
        Ontology::from_json_str(
            r#"{"kinds": ["Thing"], "edges": [
                {"parent": "Thing", "child": "Person"},
                {"parent": "Thing", "child": "Organization"},
                {"parent": "Person", "child": "Employee"}
            ]}"#,
            r#"{
                "kinds": {
                    "Person": {"properties": {
                        "name": {"type": "string", "required": true},
                        "born": {"type": "date"},
                        "skills": {"type": "string", "cardinality": "multi"},
                        "friend": {"type": {"relation": "Person"}}
                    }},
                    "Employee": {"properties": {"salary": {"type": "float"}}}
                },
                "relations": [{
                    "relation_type": "works_for",
                    "source": "Employee",
                    "target": "Organization",
                    "properties": {"role": {"type": "string", "required": true}}
                }]
            }"#,
        )
        .unwrap()
    }

    fn rule(result: Outcome) -> Option<ValidationRule> {
        result.err().map(|e| e.rule())
    }

    #[test]
    fn test_employee_with_inherited_required_name_is_valid() {
        let o = ontology();
        assert!(o
            .validate_create("Employee", &property_map([("name", "Alice")]))
            .is_ok());
    }

    #[test]
    fn test_unknown_kind_is_checked_first() {
        let o = ontology();
        let props = property_map([("bogus", 1)]);
        assert_eq!(
            rule(o.validate_create("Robot", &props)),
            Some(ValidationRule::UnknownKind)
        );
    }

    #[test]
    fn test_unknown_property_precedes_missing_required() {
        let o = ontology();
        let props = property_map([("bogus", 1)]);
        assert_eq!(
            rule(o.validate_create("Person", &props)),
            Some(ValidationRule::UnknownProperty)
        );
        assert_eq!(
            rule(o.validate_create("Person", &PropertyMap::new())),
            Some(ValidationRule::MissingRequiredProperty)
        );
    }

    #[test]
    fn test_updates_may_omit_required_properties() {
        let o = ontology();
        assert!(o
            .validate_update("Employee", &property_map([("salary", 10.5)]))
            .is_ok());
        assert_eq!(
            rule(o.validate_update("Employee", &property_map([("salary", 10)]))),
            Some(ValidationRule::TypeMismatch)
        );
    }

    #[test]
    fn test_cardinality_is_enforced() {
        let o = ontology();
        let mut props = property_map([("name", "Bob")]);
        props.insert("skills".into(), vec!["rust", "sql"].into());
        assert!(o.validate_create("Person", &props).is_ok());

        props.insert("skills".into(), "rust".into());
        assert_eq!(
            rule(o.validate_create("Person", &props)),
            Some(ValidationRule::TypeMismatch)
        );

        props.insert("skills".into(), PropertyValue::List(vec!["rust".into(), 3.into()]));
        let err = o.validate_create("Person", &props).unwrap_err();
        assert_eq!(
            err,
            ValidationError::TypeMismatch {
                kind: "Person".into(),
                property: "skills".into(),
                expected: "list of string".into(),
                found: "list of string/integer".into(),
            }
        );

        let props = property_map([("name", PropertyValue::from(vec!["a", "b"]))]);
        assert_eq!(
            rule(o.validate_create("Person", &props)),
            Some(ValidationRule::TypeMismatch)
        );
    }

    #[test]
    fn test_relation_properties_require_references() {
        let o = ontology();
        let mut props = property_map([("name", "Carol")]);
        props.insert("friend".into(), "Person/1".into());
        assert_eq!(
            rule(o.validate_create("Person", &props)),
            Some(ValidationRule::TypeMismatch)
        );

        props.insert("friend".into(), PropertyValue::reference("Person/1"));
        assert!(o.validate_create("Person", &props).is_ok());

        let refs = o.references("Person", &props);
        assert_eq!(
            refs,
            vec![Reference {
                property: "friend",
                target_id: "Person/1",
                target_kind: "Person",
            }]
        );
        assert!(o.check_reference_target("Person", &refs[0], "Employee").is_ok());
        assert_eq!(
            rule(o.check_reference_target("Person", &refs[0], "Organization")),
            Some(ValidationRule::TypeMismatch)
        );
    }

    #[test]
    fn test_relations_follow_rules_and_inheritance() {
        let o = ontology();
        let props = property_map([("role", "engineer")]);
        assert!(o
            .validate_relation("works_for", "Employee", "Organization", &props)
            .is_ok());
        assert_eq!(
            rule(o.validate_relation("works_for", "Person", "Organization", &props)),
            Some(ValidationRule::DisallowedRelation)
        );
        assert_eq!(
            rule(o.validate_relation("works_for", "Robot", "Organization", &props)),
            Some(ValidationRule::UnknownKind)
        );
        assert_eq!(
            rule(o.validate_relation("works_for", "Employee", "Organization", &PropertyMap::new())),
            Some(ValidationRule::MissingRequiredProperty)
        );
        assert_eq!(
            rule(o.validate_relation(
                "works_for",
                "Employee",
                "Organization",
                &property_map([("role", "x"), ("level", "y")])
            )),
            Some(ValidationRule::UnknownProperty)
        );
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        let o = ontology();
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let props = property_map([("name", PropertyValue::from("Dora")), ("salary", bad.into())]);
            assert_eq!(
                rule(o.validate_create("Employee", &props)),
                Some(ValidationRule::TypeMismatch)
            );
            assert_eq!(
                rule(o.validate_update("Employee", &property_map([("salary", bad)]))),
                Some(ValidationRule::TypeMismatch)
            );
        }
        assert!(o
            .validate_update("Employee", &property_map([("salary", -0.0)]))
            .is_ok());
    }

    #[test]
    fn test_relation_accepted_by_any_matching_rule() {
        let o = Ontology::from_json_str(
            r#"{"kinds": ["Thing"], "edges": [
                {"parent": "Thing", "child": "Person"},
                {"parent": "Thing", "child": "Organization"},
                {"parent": "Person", "child": "Employee"}
            ]}"#,
            r#"{
                "kinds": {},
                "relations": [
                    {"relation_type": "member_of", "source": "Person", "target": "Organization",
                     "properties": {"role": {"type": "string", "required": true}}},
                    {"relation_type": "member_of", "source": "Employee", "target": "Organization",
                     "properties": {"badge": {"type": "integer", "required": true}}}
                ]
            }"#,
        )
        .unwrap();

        let badge = property_map([("badge", 7)]);
        assert!(o
            .validate_relation("member_of", "Employee", "Organization", &badge)
            .is_ok());
        assert_eq!(
            rule(o.validate_relation("member_of", "Person", "Organization", &badge)),
            Some(ValidationRule::UnknownProperty)
        );
        assert_eq!(
            o.validate_relation("member_of", "Employee", "Organization", &PropertyMap::new()),
            Err(ValidationError::MissingRequiredProperty {
                kind: "member_of".into(),
                property: "role".into(),
            })
        );
    }

    #[test]
    fn test_removal_respects_required_and_declared() {
        let o = ontology();
        assert!(o.validate_removal("Employee", &["salary".into()]).is_ok());
        assert_eq!(
            rule(o.validate_removal("Employee", &["name".into()])),
            Some(ValidationRule::MissingRequiredProperty)
        );
        assert_eq!(
            rule(o.validate_removal("Employee", &["bogus".into()])),
            Some(ValidationRule::UnknownProperty)
        );
    }
}
