//! Request payload decoding and shape normalization.
//!
//! Mutating endpoints accept exactly two payload shapes:
//!
//! - a flat `field → value` map, updating one entity, and
//! - a map of entity id → flat map, updating several entities of the same
//!   type at once (`{"1": {"name": "a"}, "2": {"name": "b"}}`).
//!
//! Anything deeper, or a two-level map with non-numeric keys, is rejected.
//! Accepted payloads are wrapped under the target entity's name so a single
//! request can never address more than one entity type.

use crate::error::GateError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Why a payload shape was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShapeError {
    /// A two-level payload with a non-numeric top-level key.
    #[error("unsupported post dimensionality: 2 dimensional can only begin with numeric index")]
    NonNumericIndex,

    /// A payload that is neither one nor two levels deep.
    #[error("unsupported post dimensionality: you may only send 1 dimensional posts (got {0})")]
    Dimensionality(usize),

    /// Two top-level keys naming the same entity id, such as `"1"` and `"01"`.
    #[error("unsupported post dimensionality: entity id {0} appears more than once")]
    DuplicateIndex(u64),
}

/// Classified payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadShape {
    /// No payload was sent.
    Empty,
    /// Flat field map for one entity.
    SingleEntity(Map<String, Value>),
    /// Flat field maps keyed by entity id.
    BulkByIndex(BTreeMap<u64, Map<String, Value>>),
    /// Unsupported shape.
    Invalid(ShapeError),
}

/// Nesting depth of a value: scalars are 0, containers are one more than
/// their deepest child. Empty containers count as depth 1.
#[must_use]
pub fn depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(depth).max().unwrap_or(0),
        _ => 0,
    }
}

/// Classifies a decoded request body.
///
/// Top-level arrays are treated as maps keyed by their index.
///
/// # Example
///
/// ```
/// use restgate_core::payload::{classify, PayloadShape};
/// use serde_json::json;
///
/// assert!(matches!(classify(&json!({"name": "x"})), PayloadShape::SingleEntity(_)));
/// assert!(matches!(classify(&json!({"1": {"name": "x"}})), PayloadShape::BulkByIndex(_)));
/// assert!(matches!(classify(&json!({"1": {}, "x": {}})), PayloadShape::Invalid(_)));
/// ```
#[must_use]
pub fn classify(value: &Value) -> PayloadShape {
    let map = match value {
        Value::Null => return PayloadShape::Empty,
        Value::Object(map) if map.is_empty() => return PayloadShape::Empty,
        Value::Array(items) if items.is_empty() => return PayloadShape::Empty,
        Value::Object(map) => map.clone(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        _ => return PayloadShape::Invalid(ShapeError::Dimensionality(0)),
    };

    match depth(&Value::Object(map.clone())) {
        1 => PayloadShape::SingleEntity(map),
        2 => classify_bulk(map),
        other => PayloadShape::Invalid(ShapeError::Dimensionality(other)),
    }
}

fn classify_bulk(map: Map<String, Value>) -> PayloadShape {
    let mut entities = BTreeMap::new();
    for (key, value) in map {
        let Ok(id) = key.parse::<u64>() else {
            return PayloadShape::Invalid(ShapeError::NonNumericIndex);
        };
        let fields = match value {
            Value::Object(fields) => fields,
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            // a scalar next to entity rows mixes one- and two-level shapes
            _ => return PayloadShape::Invalid(ShapeError::Dimensionality(2)),
        };
        if entities.insert(id, fields).is_some() {
            return PayloadShape::Invalid(ShapeError::DuplicateIndex(id));
        }
    }
    PayloadShape::BulkByIndex(entities)
}

/// A validated payload wrapped under its entity name.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPayload {
    entity: String,
    shape: PayloadShape,
}

impl NormalizedPayload {
    /// Classifies `body` and wraps it under `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Validation`] for unsupported shapes.
    pub fn normalize(entity: impl Into<String>, body: &Value) -> Result<Self, GateError> {
        match classify(body) {
            PayloadShape::Invalid(reason) => Err(GateError::validation(reason.to_string())),
            shape => Ok(Self {
                entity: entity.into(),
                shape,
            }),
        }
    }

    /// The entity name the payload is wrapped under.
    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// The accepted shape. Never [`PayloadShape::Invalid`].
    #[must_use]
    pub fn shape(&self) -> &PayloadShape {
        &self.shape
    }

    /// Returns true if no payload was sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.shape, PayloadShape::Empty)
    }

    /// Canonical form: `{entity: fields}` or `{entity: {id: fields}}`.
    ///
    /// An empty payload yields `null`.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let inner = match &self.shape {
            PayloadShape::Empty | PayloadShape::Invalid(_) => return Value::Null,
            PayloadShape::SingleEntity(fields) => Value::Object(fields.clone()),
            PayloadShape::BulkByIndex(rows) => Value::Object(
                rows.iter()
                    .map(|(id, fields)| (id.to_string(), Value::Object(fields.clone())))
                    .collect(),
            ),
        };
        let mut wrapped = Map::new();
        wrapped.insert(self.entity.clone(), inner);
        Value::Object(wrapped)
    }
}

/// Decodes a raw request body.
///
/// `application/x-www-form-urlencoded` bodies become a flat string map and
/// everything else is parsed as JSON. An empty body decodes to `null`.
///
/// # Errors
///
/// Returns [`GateError::Validation`] if the body cannot be decoded.
pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> Result<Value, GateError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    let is_form = content_type
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        });

    if is_form {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| GateError::validation(format!("invalid form body: {e}")))?;
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        return Ok(Value::Object(map));
    }

    serde_json::from_slice(body).map_err(|e| GateError::validation(format!("invalid JSON body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_depth() {
        assert_eq!(depth(&json!(1)), 0);
        assert_eq!(depth(&json!({})), 1);
        assert_eq!(depth(&json!({"a": 1})), 1);
        assert_eq!(depth(&json!({"a": {"b": 1}, "c": 2})), 2);
        assert_eq!(depth(&json!([[[1]]])), 3);
    }

    #[test]
    fn test_single_entity_is_wrapped() {
        let payload = NormalizedPayload::normalize("User", &json!({"name": "john"})).unwrap();
        assert_eq!(payload.to_value(), json!({"User": {"name": "john"}}));
    }

    #[test]
    fn test_bulk_by_index() {
        let body = json!({"2": {"name": "b"}, "1": {"name": "a"}});
        let payload = NormalizedPayload::normalize("User", &body).unwrap();
        let PayloadShape::BulkByIndex(rows) = payload.shape() else {
            panic!("expected bulk shape");
        };
        assert_eq!(rows.keys().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(
            payload.to_value(),
            json!({"User": {"1": {"name": "a"}, "2": {"name": "b"}}})
        );
    }

    #[test]
    fn test_mixed_keys_rejected() {
        let err = NormalizedPayload::normalize("User", &json!({"1": {"a": 1}, "x": {"b": 2}}))
            .unwrap_err();
        assert!(matches!(err, GateError::Validation { .. }));
        assert!(err.message().contains("unsupported post dimensionality"));
    }

    #[test]
    fn test_equal_numeric_ids_rejected() {
        let body = json!({"1": {"name": "a"}, "01": {"name": "b"}});
        assert_eq!(
            classify(&body),
            PayloadShape::Invalid(ShapeError::DuplicateIndex(1))
        );
        let err = NormalizedPayload::normalize("User", &body).unwrap_err();
        assert!(matches!(err, GateError::Validation { .. }));
    }

    #[test]
    fn test_too_deep_rejected() {
        assert_eq!(
            classify(&json!({"1": {"a": {"b": 1}}})),
            PayloadShape::Invalid(ShapeError::Dimensionality(3))
        );
    }

    #[test]
    fn test_scalar_next_to_rows_rejected() {
        assert_eq!(
            classify(&json!({"1": {"a": 1}, "2": "x"})),
            PayloadShape::Invalid(ShapeError::Dimensionality(2))
        );
    }

    #[test]
    fn test_empty_and_scalar_bodies() {
        assert_eq!(classify(&Value::Null), PayloadShape::Empty);
        assert_eq!(classify(&json!({})), PayloadShape::Empty);
        assert_eq!(
            classify(&json!("text")),
            PayloadShape::Invalid(ShapeError::Dimensionality(0))
        );
        let payload = NormalizedPayload::normalize("User", &Value::Null).unwrap();
        assert!(payload.is_empty());
        assert_eq!(payload.to_value(), Value::Null);
    }

    #[test]
    fn test_top_level_array_is_index_keyed() {
        let shape = classify(&json!([{"name": "a"}, {"name": "b"}]));
        let PayloadShape::BulkByIndex(rows) = shape else {
            panic!("expected bulk shape");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[&0]["name"], "a");
    }

    #[test]
    fn test_decode_form_body() {
        let value = decode_body(
            Some("application/x-www-form-urlencoded; charset=utf-8"),
            b"name=john+doe&age=42",
        )
        .unwrap();
        assert_eq!(value, json!({"name": "john doe", "age": "42"}));
    }

    #[test]
    fn test_decode_json_and_empty() {
        assert_eq!(
            decode_body(Some("application/json"), br#"{"a":1}"#).unwrap(),
            json!({"a": 1})
        );
        assert_eq!(decode_body(None, b"").unwrap(), Value::Null);
        assert_eq!(decode_body(None, b"  \n").unwrap(), Value::Null);
        assert!(decode_body(None, b"{nope").is_err());
    }

    proptest! {
        #[test]
        fn prop_flat_maps_wrap_under_one_entity(
            fields in prop::collection::btree_map("[a-z_]{1,10}", "[a-zA-Z0-9 ]{0,10}", 1..8),
        ) {
            let body: Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            let payload = NormalizedPayload::normalize("Post", &Value::Object(body.clone())).unwrap();
            let value = payload.to_value();
            let wrapped = value.as_object().unwrap();
            prop_assert_eq!(wrapped.len(), 1);
            prop_assert_eq!(wrapped.get("Post"), Some(&Value::Object(body)));
        }

        #[test]
        fn prop_non_numeric_key_at_depth_two_fails(
            id in 0u64..10_000,
            key in "[a-z]{1,8}",
        ) {
            let body = json!({ id.to_string(): {"f": 1}, key: {"g": 2} });
            prop_assert_eq!(classify(&body), PayloadShape::Invalid(ShapeError::NonNumericIndex));
        }
    }
}
