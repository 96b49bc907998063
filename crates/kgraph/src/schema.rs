//! TerminusDB schema derived from the ontology.
//!
//! One class per kind, with `@inherits` mirroring the hierarchy. Property
//! values are stored in their tagged form, so every property is an optional
//! `sys:JSON` field: the ontology, not the engine, enforces types and
//! required-ness. Bookkeeping fields live on root kinds and are inherited.

use kgraph_ontology::Ontology;
use kgraph_store::document::{CREATED_AT, DELETED_AT, HISTORY, RELATIONS, UPDATED_AT};
use serde_json::{json, Map, Value};

fn optional(class: &str) -> Value {
    json!({ "@type": "Optional", "@class": class })
}

/// The `@context` document followed by one class document per kind.
pub fn terminus_classes(ontology: &Ontology) -> Vec<Value> {
    let hierarchy = ontology.hierarchy();
    let model = ontology.model();

    let mut classes = vec![json!({
        "@type": "@context",
        "@base": "terminusdb:///data/",
        "@schema": "terminusdb:///schema#",
    })];

    for kind in hierarchy.kinds() {
        let mut class = Map::new();
        class.insert("@type".into(), json!("Class"));
        class.insert("@id".into(), json!(kind));
        class.insert("@key".into(), json!({ "@type": "Random" }));

        let parents = hierarchy.parents_of(kind);
        if parents.is_empty() {
            class.insert(CREATED_AT.into(), json!("xsd:string"));
            class.insert(UPDATED_AT.into(), json!("xsd:string"));
            class.insert(DELETED_AT.into(), optional("xsd:string"));
            class.insert(RELATIONS.into(), optional("sys:JSON"));
            class.insert(HISTORY.into(), optional("sys:JSON"));
        } else {
            class.insert("@inherits".into(), json!(parents));
        }

        // A redeclared property is already inherited from the ancestor.
        for def in model.declared_properties(kind) {
            let inherited = hierarchy.ancestors_of(kind).iter().any(|ancestor| {
                model
                    .declared_properties(ancestor)
                    .any(|d| d.name == def.name)
            });
            if !inherited {
                class.insert(def.name.clone(), optional("sys:JSON"));
            }
        }

        classes.push(Value::Object(class));
    }

    tracing::debug!(classes = classes.len() - 1, "TerminusDB schema derived");
    classes
}
