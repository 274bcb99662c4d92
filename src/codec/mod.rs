//! Conversion between structured JSON values and BSON documents
//!
//! MongoDB Extended JSON is the interchange format in both directions: a
//! `{"$oid": "..."}` wrapper in a parameter becomes a native `ObjectId`, and a
//! native `ObjectId` in a result comes back as the same wrapper. Results use
//! the relaxed form, so 32/64-bit integers that fit a JSON number stay plain
//! numbers.

use mongodb::bson::{Bson, Document};
use serde_json::{Map, Value};

use crate::error::{ResolverError, Result};

/// Extended JSON tag of an object id literal
pub const OID_TAG: &str = "$oid";

/// Extended JSON tag of a 64-bit integer literal
pub const NUMBER_LONG_TAG: &str = "$numberLong";

/// Backend name of the primary key field
pub const ID_FIELD: &str = "_id";

/// Public name the primary key is renamed to by normalization
pub const PUBLIC_ID_FIELD: &str = "id";

/// Operator update plain fields are nested under
const SET_OPERATOR: &str = "$set";

/// Convert a JSON value to BSON, decoding Extended JSON wrappers
pub fn to_bson(value: &Value) -> Result<Bson> {
    Bson::try_from(value.clone()).map_err(|e| ResolverError::Codec(e.to_string()))
}

/// Convert a JSON object to a BSON document
///
/// # Returns
/// * `Result<Document>` - The document, or a codec error when `value` is not an object
pub fn to_document(value: &Value) -> Result<Document> {
    match to_bson(value)? {
        Bson::Document(doc) => Ok(doc),
        other => Err(ResolverError::Codec(format!(
            "expected a JSON object, found {:?}",
            other.element_type()
        ))),
    }
}

/// Convert a JSON array of objects to BSON documents
pub fn to_documents(values: &[Value]) -> Result<Vec<Document>> {
    values.iter().map(to_document).collect()
}

/// Convert an optional document to a JSON value
///
/// A missing document becomes an explicit `null`.
pub fn to_value(document: Option<Document>) -> Value {
    match document {
        Some(doc) => Bson::Document(doc).into_relaxed_extjson(),
        None => Value::Null,
    }
}

/// Convert any BSON value to JSON
pub fn bson_to_value(bson: Bson) -> Value {
    bson.into_relaxed_extjson()
}

/// Build an update document from a plain or operator-style object
///
/// Top-level keys starting with `$` pass through; all others are collected
/// under `$set`, so `{a: 1, b: 2}` behaves like `{$set: {a: 1, b: 2}}`.
pub fn to_update_document(value: &Value) -> Result<Document> {
    let object = value.as_object().ok_or_else(|| {
        ResolverError::Codec("update specification must be a JSON object".to_string())
    })?;

    let mut update = Map::new();
    let mut set = match object.get(SET_OPERATOR) {
        Some(Value::Object(existing)) => existing.clone(),
        _ => Map::new(),
    };

    for (key, element) in object {
        if key == SET_OPERATOR {
            continue;
        }
        if key.starts_with('$') {
            update.insert(key.clone(), element.clone());
        } else {
            set.insert(key.clone(), element.clone());
        }
    }

    if !set.is_empty() || object.contains_key(SET_OPERATOR) {
        update.insert(SET_OPERATOR.to_string(), Value::Object(set));
    }

    to_document(&Value::Object(update))
}

/// Build an id filter from an id string
///
/// Surrounding double quotes are stripped. With a `field` the wrapper is nested
/// under that name, e.g. `{"_id": {"$oid": "..."}}`.
pub fn object_id_filter(id: &str, field: Option<&str>) -> Option<Value> {
    let id = id.trim();
    let id = id
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(id);
    if id.is_empty() {
        return None;
    }

    let mut wrapper = Map::new();
    wrapper.insert(OID_TAG.to_string(), Value::String(id.to_string()));
    let wrapper = Value::Object(wrapper);

    match field.filter(|f| !f.is_empty()) {
        Some(name) => {
            let mut outer = Map::new();
            outer.insert(name.to_string(), wrapper);
            Some(Value::Object(outer))
        }
        None => Some(wrapper),
    }
}
