//! Write operations: insert, update, remove

use mongodb::Collection;
use mongodb::bson::{Bson, Document};
use mongodb::options::UpdateOptions;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::codec;
use crate::error::{ExecutionError, Result};
use crate::parser::CallDescriptor;

use super::result::OperationResult;
use super::{document_param, ensure_at_most, flag_value};

/// Write operations implementation
impl super::QueryResolver {
    /// Execute insert
    ///
    /// The single parameter is a document or an array of documents.
    ///
    /// # Returns
    /// * `Result<Value>` - Operation result with generated ids in insertion order
    pub(super) async fn execute_insert(
        &self,
        coll: &Collection<Document>,
        call: &CallDescriptor,
    ) -> Result<Value> {
        let documents = match call.parameters.as_slice() {
            [Value::Array(items)] => codec::to_documents(items)?,
            [single @ Value::Object(_)] => vec![codec::to_document(single)?],
            _ => {
                return Err(ExecutionError::InvalidParameters(
                    "insert expects one document or an array of documents".to_string(),
                )
                .into());
            }
        };

        if documents.is_empty() {
            return Ok(OperationResult::default().to_value());
        }

        debug!("insert of {} document(s) into '{}'", documents.len(), coll.name());

        let count = documents.len() as u64;
        let result = coll.insert_many(documents).await?;

        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        let keys = ids.into_iter().map(|(_, id)| id_to_key(id)).collect();

        info!("Inserted {} document(s) into '{}'", count, coll.name());
        Ok(OperationResult::new(count, keys).to_value())
    }

    /// Execute update
    ///
    /// Parameters: filter, update specification, optional `{multi, upsert}`.
    /// Plain fields of the update are applied through `$set`.
    ///
    /// # Returns
    /// * `Result<Value>` - Operation result with the modified count and upserted id
    pub(super) async fn execute_update(
        &self,
        coll: &Collection<Document>,
        call: &CallDescriptor,
    ) -> Result<Value> {
        let plan = update_plan(call)?;

        debug!(
            "update on '{}' filter={:?} update={:?} multi={} upsert={:?}",
            coll.name(),
            plan.filter,
            plan.update,
            plan.multi,
            plan.options.upsert
        );

        let result = if plan.multi {
            coll.update_many(plan.filter, plan.update)
                .with_options(plan.options)
                .await?
        } else {
            coll.update_one(plan.filter, plan.update)
                .with_options(plan.options)
                .await?
        };

        let keys = result.upserted_id.map(id_to_key).into_iter().collect();

        info!(
            "Updated '{}': matched {}, modified {}",
            coll.name(),
            result.matched_count,
            result.modified_count
        );
        Ok(OperationResult::new(result.modified_count, keys).to_value())
    }

    /// Execute remove
    ///
    /// No parameters removes everything. With a filter, all matches are
    /// removed unless the second parameter is truthy or `{justOne: <truthy>}`.
    ///
    /// # Returns
    /// * `Result<Value>` - Operation result with the deleted count
    pub(super) async fn execute_remove(
        &self,
        coll: &Collection<Document>,
        call: &CallDescriptor,
    ) -> Result<Value> {
        let result = match remove_plan(call)? {
            RemovePlan::All => {
                debug!("remove of all documents from '{}'", coll.name());
                coll.delete_many(Document::new()).await?
            }
            RemovePlan::One(filter) => {
                debug!("remove one from '{}' filter={:?}", coll.name(), filter);
                coll.delete_one(filter).await?
            }
            RemovePlan::Many(filter) => {
                debug!("remove many from '{}' filter={:?}", coll.name(), filter);
                coll.delete_many(filter).await?
            }
        };

        info!(
            "Removed {} document(s) from '{}'",
            result.deleted_count,
            coll.name()
        );
        Ok(OperationResult::new(result.deleted_count, Vec::new()).to_value())
    }
}

/// Driver call an update resolves to
#[derive(Debug)]
struct UpdatePlan {
    filter: Document,
    update: Document,
    /// `update_many` instead of `update_one`
    multi: bool,
    options: UpdateOptions,
}

fn update_plan(call: &CallDescriptor) -> Result<UpdatePlan> {
    ensure_at_most(call, 3)?;

    let filter = document_param(call, 0, "a filter document")?;
    let update = match call.parameter(1) {
        Some(spec @ Value::Object(_)) => codec::to_update_document(spec)?,
        _ => {
            return Err(ExecutionError::InvalidParameters(
                "update expects an update document as parameter 2".to_string(),
            )
            .into());
        }
    };

    let flags = match call.parameter(2) {
        Some(Value::Object(flags)) => Some(flags),
        Some(Value::Null) | None => None,
        Some(other) => {
            return Err(ExecutionError::InvalidParameters(format!(
                "update expects an options object as parameter 3, found {other}"
            ))
            .into());
        }
    };
    let multi = flag(flags, "multi")?;

    let mut options = UpdateOptions::default();
    if flag(flags, "upsert")? {
        options.upsert = Some(true);
    }

    Ok(UpdatePlan {
        filter,
        update,
        multi,
        options,
    })
}

/// Driver call a remove resolves to
#[derive(Debug, PartialEq)]
enum RemovePlan {
    All,
    One(Document),
    Many(Document),
}

fn remove_plan(call: &CallDescriptor) -> Result<RemovePlan> {
    ensure_at_most(call, 2)?;

    if call.parameters.is_empty() {
        return Ok(RemovePlan::All);
    }
    let filter = document_param(call, 0, "a filter document")?;
    if just_one(call.parameter(1))? {
        Ok(RemovePlan::One(filter))
    } else {
        Ok(RemovePlan::Many(filter))
    }
}

/// String form of a generated or upserted id
fn id_to_key(id: Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s,
        other => codec::bson_to_value(other).to_string(),
    }
}

fn flag(options: Option<&Map<String, Value>>, name: &str) -> Result<bool> {
    match options.and_then(|o| o.get(name)) {
        Some(value) => flag_value(value).ok_or_else(|| {
            ExecutionError::InvalidParameters(format!(
                "option '{name}' expects a boolean flag, found {value}"
            ))
            .into()
        }),
        None => Ok(false),
    }
}

/// Whether a remove's second parameter restricts it to one document
fn just_one(restriction: Option<&Value>) -> Result<bool> {
    match restriction {
        Some(Value::Object(options)) => flag(Some(options), "justOne"),
        Some(value) => flag_value(value).ok_or_else(|| {
            ExecutionError::InvalidParameters(format!(
                "remove expects a justOne flag as parameter 2, found {value}"
            ))
            .into()
        }),
        None => Ok(false),
    }
}
