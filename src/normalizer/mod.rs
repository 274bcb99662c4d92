//! Rewriting of Extended JSON wrappers in results
//!
//! Results decoded from BSON carry wrappers such as `{"$oid": "..."}` and
//! `{"$numberLong": "..."}`. Callers that want plain values run one pass of
//! [`normalize`]:
//!
//! - [`NormalizeMode::IdOnly`] unwraps text object ids only
//! - [`NormalizeMode::AllSpecialFields`] also turns 64-bit wrappers into integers
//!
//! In both modes a `_id` property whose value was an object-id wrapper is
//! renamed to `id`. A wrapper is recognized structurally: an object with
//! exactly one property whose name is a known tag.

use serde_json::{Map, Value};

use crate::codec::{ID_FIELD, NUMBER_LONG_TAG, OID_TAG, PUBLIC_ID_FIELD};

/// Which wrappers a normalization pass rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// `{"$oid": "<text>"}` only
    IdOnly,
    /// `{"$oid": ...}` and `{"$numberLong": ...}`
    AllSpecialFields,
}

/// Normalize a value depth-first, returning the rewritten tree
///
/// Containers that are not wrappers keep their shape; only wrapper nodes are
/// replaced and only wrapped `_id` keys are renamed.
pub fn normalize(value: Value, mode: NormalizeMode) -> Value {
    if let Some(unwrapped) = unwrap_special(&value, mode) {
        return unwrapped;
    }

    match value {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| normalize(item, mode))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            let mut renamed_id = None;
            for (key, item) in map {
                let rename = key == ID_FIELD && is_oid_wrapper(&item, mode);
                let item = normalize(item, mode);
                if rename {
                    renamed_id = Some(item);
                } else {
                    out.insert(key, item);
                }
            }
            // The unwrapped object id wins over a plain `id` property.
            if let Some(id) = renamed_id {
                out.insert(PUBLIC_ID_FIELD.to_string(), id);
            }
            Value::Object(out)
        }
        scalar => scalar,
    }
}

/// Replacement for a wrapper node, or `None` when `value` is not one
fn unwrap_special(value: &Value, mode: NormalizeMode) -> Option<Value> {
    let (tag, inner) = single_property(value)?;

    match (tag, mode) {
        (OID_TAG, NormalizeMode::IdOnly) => inner.as_str().map(|s| Value::String(s.to_string())),
        (OID_TAG, NormalizeMode::AllSpecialFields) => Some(inner.clone()),
        (NUMBER_LONG_TAG, NormalizeMode::AllSpecialFields) => parse_long(inner).map(Value::from),
        _ => None,
    }
}

fn is_oid_wrapper(value: &Value, mode: NormalizeMode) -> bool {
    matches!(single_property(value), Some((OID_TAG, _))) && unwrap_special(value, mode).is_some()
}

fn single_property(value: &Value) -> Option<(&str, &Value)> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.iter().next().map(|(key, inner)| (key.as_str(), inner))
}

fn parse_long(value: &Value) -> Option<i64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}
