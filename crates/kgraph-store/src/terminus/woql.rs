//! WOQL query construction.
//!
//! Queries are built as JSON-LD values in the shape the `/api/woql`
//! endpoint accepts.

use serde_json::{json, Value};

use crate::document::CREATED_AT;

/// Variable bound to each document's id.
pub const ID_VAR: &str = "Id";
/// Variable bound to each document's JSON.
pub const DOC_VAR: &str = "Doc";

fn node_var(name: &str) -> Value {
    json!({ "@type": "NodeValue", "variable": name })
}

fn node(iri: &str) -> Value {
    json!({ "@type": "NodeValue", "node": iri })
}

pub fn triple(subject: Value, predicate: Value, object: Value) -> Value {
    json!({
        "@type": "Triple",
        "subject": subject,
        "predicate": predicate,
        "object": object,
    })
}

/// `Id` has type `@schema:<kind>`.
pub fn is_of_type(kind: &str) -> Value {
    triple(
        node_var(ID_VAR),
        node("rdf:type"),
        json!({ "@type": "Value", "node": format!("@schema:{kind}") }),
    )
}

/// `Id` is an entity document: every one carries a creation stamp.
pub fn is_entity() -> Value {
    triple(
        node_var(ID_VAR),
        node(&format!("@schema:{CREATED_AT}")),
        json!({ "@type": "Value", "variable": "CreatedAt" }),
    )
}

pub fn and(queries: Vec<Value>) -> Value {
    json!({ "@type": "And", "and": queries })
}

pub fn or(queries: Vec<Value>) -> Value {
    json!({ "@type": "Or", "or": queries })
}

pub fn read_document() -> Value {
    json!({
        "@type": "ReadDocument",
        "identifier": node_var(ID_VAR),
        "document": { "@type": "Value", "variable": DOC_VAR },
    })
}

/// Entity documents of `types` (all of them when empty), ordered by id,
/// `count` of them starting at `skip`.
pub fn list_documents(types: &[String], skip: usize, count: usize) -> Value {
    let selector = match types {
        [] => is_entity(),
        [kind] => is_of_type(kind),
        kinds => or(kinds.iter().map(|k| is_of_type(k)).collect()),
    };
    let ordered = json!({
        "@type": "OrderBy",
        "ordering": [{ "@type": "OrderTemplate", "order": "asc", "variable": ID_VAR }],
        "query": and(vec![selector, read_document()]),
    });
    json!({
        "@type": "Limit",
        "limit": count,
        "query": { "@type": "Start", "start": skip, "query": ordered },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_kind_listing_is_paged_and_ordered() {
        let query = list_documents(&["Person".to_string()], 20, 10);
        assert_eq!(query["@type"], "Limit");
        assert_eq!(query["limit"], 10);
        assert_eq!(query["query"]["start"], 20);

        let ordered = &query["query"]["query"];
        assert_eq!(ordered["ordering"][0]["variable"], ID_VAR);
        let selector = &ordered["query"]["and"][0];
        assert_eq!(selector["@type"], "Triple");
        assert_eq!(selector["object"]["node"], "@schema:Person");
        assert_eq!(ordered["query"]["and"][1]["@type"], "ReadDocument");
    }

    #[test]
    fn test_several_kinds_are_a_disjunction() {
        let kinds = vec!["Person".to_string(), "Employee".to_string()];
        let query = list_documents(&kinds, 0, 5);
        let selector = &query["query"]["query"]["query"]["and"][0];
        assert_eq!(selector["@type"], "Or");
        assert_eq!(selector["or"].as_array().unwrap().len(), 2);
        assert_eq!(selector["or"][1]["object"]["node"], "@schema:Employee");
    }

    #[test]
    fn test_no_kinds_selects_every_entity() {
        let query = list_documents(&[], 0, 5);
        let selector = &query["query"]["query"]["query"]["and"][0];
        assert_eq!(selector["predicate"]["node"], "@schema:_created_at");
    }
}
