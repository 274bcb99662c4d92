//! findAndModify with its update and remove branches

use std::time::Duration;

use mongodb::Collection;
use mongodb::bson::Document;
use mongodb::options::{
    Collation, FindOneAndDeleteOptions, FindOneAndUpdateOptions, ReturnDocument,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info};

use crate::codec;
use crate::error::{ExecutionError, Result};
use crate::parser::CallDescriptor;

use super::flag_value;

/// The single object parameter of a findAndModify call
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindAndModifySpec {
    query: Option<Value>,
    sort: Option<Value>,
    update: Option<Value>,
    #[serde(default, deserialize_with = "truthy")]
    remove: bool,
    /// Return the document as it is after the update
    #[serde(default, deserialize_with = "truthy")]
    new: bool,
    fields: Option<Value>,
    #[serde(default, deserialize_with = "truthy")]
    upsert: bool,
    bypass_document_validation: Option<bool>,
    #[serde(rename = "maxTimeMS")]
    max_time_ms: Option<u64>,
    collation: Option<Collation>,
}

/// Accept shell-style flags: booleans, or numbers where non-zero means true
fn truthy<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    flag_value(&value).ok_or_else(|| {
        serde::de::Error::custom(format!("expected a boolean flag, found {value}"))
    })
}

impl FindAndModifySpec {
    fn from_call(call: &CallDescriptor) -> Result<Self> {
        let param = match call.parameters.as_slice() {
            [param @ Value::Object(_)] => param.clone(),
            _ => {
                return Err(ExecutionError::InvalidParameters(
                    "findAndModify expects exactly one specification object".to_string(),
                )
                .into());
            }
        };
        serde_json::from_value(param)
            .map_err(|e| ExecutionError::InvalidParameters(format!("findAndModify: {e}")).into())
    }

    fn filter(&self) -> Result<Document> {
        optional_document(&self.query).map(Option::unwrap_or_default)
    }
}

fn optional_document(value: &Option<Value>) -> Result<Option<Document>> {
    match value {
        Some(Value::Null) | None => Ok(None),
        Some(value) => codec::to_document(value).map(Some),
    }
}

/// FindAndModify implementation
impl super::QueryResolver {
    /// Execute findAndModify
    ///
    /// The specification carries `query` and either `update` or `remove`.
    ///
    /// # Returns
    /// * `Result<Value>` - The matched document, or `null` when none matched
    pub(super) async fn execute_find_and_modify(
        &self,
        coll: &Collection<Document>,
        call: &CallDescriptor,
    ) -> Result<Value> {
        let spec = FindAndModifySpec::from_call(call)?;
        let has_update = matches!(spec.update, Some(Value::Object(_)));

        match (has_update, spec.remove) {
            (true, false) => self.find_and_update(coll, spec).await,
            (false, true) => self.find_and_remove(coll, spec).await,
            (true, true) => Err(ExecutionError::InvalidParameters(
                "findAndModify accepts either update or remove, not both".to_string(),
            )
            .into()),
            (false, false) => Err(ExecutionError::InvalidParameters(
                "findAndModify requires either an update document or remove: true".to_string(),
            )
            .into()),
        }
    }

    async fn find_and_update(
        &self,
        coll: &Collection<Document>,
        spec: FindAndModifySpec,
    ) -> Result<Value> {
        let filter = spec.filter()?;
        let update = match &spec.update {
            Some(update) => codec::to_update_document(update)?,
            None => Document::new(),
        };

        let mut options = FindOneAndUpdateOptions::default();
        options.return_document = Some(if spec.new {
            ReturnDocument::After
        } else {
            ReturnDocument::Before
        });
        options.sort = optional_document(&spec.sort)?;
        options.projection = optional_document(&spec.fields)?;
        if spec.upsert {
            options.upsert = Some(true);
        }
        options.bypass_document_validation = spec.bypass_document_validation;
        options.max_time = spec.max_time_ms.map(Duration::from_millis);
        options.collation = spec.collation;

        debug!(
            "findAndModify (update) on '{}' filter={:?} update={:?} new={}",
            coll.name(),
            filter,
            update,
            spec.new
        );

        let result = coll
            .find_one_and_update(filter, update)
            .with_options(options)
            .await?;

        if result.is_some() {
            info!("FindAndModify updated a document in '{}'", coll.name());
        } else {
            info!("FindAndModify found no document to update in '{}'", coll.name());
        }
        Ok(codec::to_value(result))
    }

    async fn find_and_remove(
        &self,
        coll: &Collection<Document>,
        spec: FindAndModifySpec,
    ) -> Result<Value> {
        let filter = spec.filter()?;

        let mut options = FindOneAndDeleteOptions::default();
        options.sort = optional_document(&spec.sort)?;
        options.projection = optional_document(&spec.fields)?;
        options.max_time = spec.max_time_ms.map(Duration::from_millis);
        options.collation = spec.collation;

        debug!(
            "findAndModify (remove) on '{}' filter={:?}",
            coll.name(),
            filter
        );

        let result = coll
            .find_one_and_delete(filter)
            .with_options(options)
            .await?;

        if result.is_some() {
            info!("FindAndModify removed a document from '{}'", coll.name());
        }
        Ok(codec::to_value(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CallParser;
    use mongodb::bson::doc;
    use mongodb::options::CollationStrength;

    fn spec(query: &str) -> Result<FindAndModifySpec> {
        FindAndModifySpec::from_call(&CallParser::parse_call(query).unwrap())
    }

    #[test]
    fn test_update_spec_with_options() {
        let spec = spec(
            r#"db.users.findAndModify({
                "query": {"name": "Ann"},
                "sort": {"age": -1},
                "update": {"age": 32},
                "new": true,
                "fields": {"age": 1},
                "upsert": 1,
                "bypassDocumentValidation": true,
                "maxTimeMS": 500,
                "collation": {"locale": "en", "strength": 2}
            })"#,
        )
        .unwrap();

        assert!(spec.new);
        assert!(spec.upsert);
        assert!(!spec.remove);
        assert_eq!(spec.filter().unwrap(), doc! { "name": "Ann" });
        assert_eq!(spec.bypass_document_validation, Some(true));
        assert_eq!(spec.max_time_ms, Some(500));
        let collation = spec.collation.unwrap();
        assert_eq!(collation.locale, "en");
        assert!(matches!(collation.strength, Some(CollationStrength::Secondary)));
    }

    #[test]
    fn test_remove_spec_defaults() {
        let spec = spec(r#"db.users.findAndModify({"remove": true})"#).unwrap();
        assert!(spec.remove);
        assert!(!spec.new);
        assert_eq!(spec.filter().unwrap(), Document::new());
        assert!(spec.update.is_none());
    }

    #[test]
    fn test_spec_requires_single_object() {
        assert!(spec(r#"db.users.findAndModify()"#).is_err());
        assert!(spec(r#"db.users.findAndModify({"remove":true}, {})"#).is_err());
        assert!(spec(r#"db.users.findAndModify([{"remove":true}])"#).is_err());
    }

    #[test]
    fn test_spec_rejects_bad_flag() {
        let err = spec(r#"db.users.findAndModify({"remove": "yes"})"#).unwrap_err();
        assert!(err.to_string().contains("boolean flag"));
    }
}
