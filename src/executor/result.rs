//! Write operation results
//!
//! Insert, update and remove handlers report an [`OperationResult`] serialized
//! into the structured value they return. [`to_operation_result`] turns such a
//! value, or a raw backend write summary, back into the typed form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ResolverError, Result};
use crate::normalizer::{NormalizeMode, normalize};

/// Backend counters summed when no operation result is present
const COUNTER_FIELDS: [&str; 4] = ["nInserted", "nUpserted", "nModified", "nRemoved"];

/// Uniform summary of a write operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    /// Number of documents inserted, modified or removed
    #[serde(default)]
    pub manipulation_count: u64,

    /// Identifiers of the documents created, in insertion order
    #[serde(default)]
    pub affected_keys: Vec<String>,
}

impl OperationResult {
    pub fn new(manipulation_count: u64, affected_keys: Vec<String>) -> Self {
        Self {
            manipulation_count,
            affected_keys,
        }
    }

    /// Structured value form, as returned by the dispatcher
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "manipulationCount": self.manipulation_count,
            "affectedKeys": self.affected_keys,
        })
    }
}

/// Convert a resolved value into an operation result
///
/// # Arguments
/// * `result` - Value returned by the dispatcher
/// * `normalize_ids` - Run the id-only normalization pass first
///
/// # Returns
/// * `Result<Option<OperationResult>>` - `None` for a null result, an empty
///   result for values that are not objects
pub fn to_operation_result(result: Value, normalize_ids: bool) -> Result<Option<OperationResult>> {
    if result.is_null() {
        return Ok(None);
    }
    let result = if normalize_ids {
        normalize(result, NormalizeMode::IdOnly)
    } else {
        result
    };

    // Reads such as find produce arrays or scalars; they manipulate nothing.
    let Some(object) = result.as_object() else {
        return Ok(Some(OperationResult::default()));
    };

    if object.contains_key("manipulationCount") || object.contains_key("affectedKeys") {
        let adapted = serde_json::from_value(result.clone())
            .map_err(|e| ResolverError::Codec(e.to_string()))?;
        return Ok(Some(adapted));
    }

    let manipulation_count = COUNTER_FIELDS
        .iter()
        .filter_map(|field| object.get(*field).and_then(Value::as_u64))
        .sum();

    let affected_keys = match object.get("id") {
        Some(Value::String(id)) => vec![id.clone()],
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.to_string()],
    };

    Ok(Some(OperationResult::new(manipulation_count, affected_keys)))
}
