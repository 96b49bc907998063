//! Encoding of typed property values and timestamps for storage.
//!
//! Values are stored as tagged JSON so a value read back has exactly the
//! type it was written with, whichever engine held it.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use kgraph_core::{PropertyMap, PropertyValue};

use crate::{Result, StoreError};

/// Prefix for property fields on property-graph nodes and edges.
pub const PROPERTY_PREFIX: &str = "p_";

pub fn property_field(name: &str) -> String {
    format!("{PROPERTY_PREFIX}{name}")
}

/// Canonical stored form: `-0.0` is stored as `0.0`, so equal values always
/// encode to the same text. Non-finite floats have no JSON form and are
/// refused.
fn canonical(value: &PropertyValue) -> Result<PropertyValue> {
    match value {
        PropertyValue::Float(x) if !x.is_finite() => Err(StoreError::Serialization(format!(
            "non-finite float {x} cannot be stored"
        ))),
        PropertyValue::Float(x) if *x == 0.0 => Ok(PropertyValue::Float(0.0)),
        PropertyValue::List(items) => Ok(PropertyValue::List(
            items.iter().map(canonical).collect::<Result<_>>()?,
        )),
        other => Ok(other.clone()),
    }
}

pub fn encode_value(value: &PropertyValue) -> Result<String> {
    Ok(serde_json::to_string(&canonical(value)?)?)
}

pub fn decode_value(text: &str) -> Result<PropertyValue> {
    Ok(serde_json::from_str(text)?)
}

pub fn value_to_json(value: &PropertyValue) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(canonical(value)?)?)
}

pub fn value_from_json(value: serde_json::Value) -> Result<PropertyValue> {
    Ok(serde_json::from_value(value)?)
}

/// The current instant at stored precision, so it survives formatting
/// unchanged.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{text}': {e}")))
}

/// Properties as `p_<name>` → tagged JSON text.
pub fn encode_properties(properties: &PropertyMap) -> Result<BTreeMap<String, String>> {
    properties
        .iter()
        .map(|(name, value)| Ok((property_field(name), encode_value(value)?)))
        .collect()
}

/// Inverse of [`encode_properties`]; fields without the prefix are ignored.
pub fn decode_properties(fields: &BTreeMap<String, String>) -> Result<PropertyMap> {
    fields
        .iter()
        .filter_map(|(field, text)| {
            field
                .strip_prefix(PROPERTY_PREFIX)
                .map(|name| Ok((name.to_string(), decode_value(text)?)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use kgraph_core::property_map;

    #[test]
    fn test_properties_keep_their_types() {
        let mut props = property_map([("name", "Alice")]);
        props.insert("age".into(), 41.into());
        props.insert("score".into(), 41.0.into());
        props.insert(
            "born".into(),
            NaiveDate::from_ymd_opt(1983, 2, 1).unwrap().into(),
        );
        props.insert("boss".into(), PropertyValue::reference("Person/1"));

        let mut fields = encode_properties(&props).unwrap();
        assert!(fields.contains_key("p_age"));
        fields.insert("created_at".into(), "2024-01-01T00:00:00Z".into());

        let back = decode_properties(&fields).unwrap();
        assert_eq!(back, props);
        assert_eq!(back["age"], PropertyValue::Integer(41));
        assert_eq!(back["score"], PropertyValue::Float(41.0));
    }

    #[test]
    fn test_signed_zero_encodes_like_zero() {
        let negative = PropertyValue::Float(-0.0);
        assert_eq!(
            encode_value(&negative).unwrap(),
            encode_value(&PropertyValue::Float(0.0)).unwrap()
        );
        assert_eq!(
            value_to_json(&PropertyValue::List(vec![negative])).unwrap(),
            value_to_json(&PropertyValue::List(vec![0.0.into()])).unwrap()
        );
    }

    #[test]
    fn test_non_finite_floats_are_refused() {
        for bad in [f64::NAN, f64::INFINITY] {
            assert!(encode_value(&bad.into()).is_err());
            assert!(value_to_json(&PropertyValue::List(vec![1.0.into(), bad.into()])).is_err());
        }
    }

    #[test]
    fn test_timestamps_round_trip() {
        let now = Utc::now();
        let parsed = parse_timestamp(&format_timestamp(now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
        assert!(parse_timestamp("yesterday").is_err());

        let stamp = super::now();
        assert_eq!(parse_timestamp(&format_timestamp(stamp)).unwrap(), stamp);
    }
}
