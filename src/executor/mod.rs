//! Operation dispatcher
//!
//! [`QueryResolver`] takes a parsed [`CallDescriptor`] and runs the matching
//! handler against a collection. Handlers are grouped by kind:
//! - `read`: find, aggregate
//! - `write`: insert, update, remove
//! - `find_and_modify`: findAndModify (update and remove branches)
//! - `script`: `;`-terminated statements evaluated server-side
//!
//! Read handlers return documents as structured values; write handlers return
//! the structured value of an [`OperationResult`].

use mongodb::bson::Document;
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tracing::debug;

use crate::codec;
use crate::error::{ExecutionError, Result};
use crate::parser::{CallDescriptor, CallParser, Operation, ParsedQuery};

mod find_and_modify;
mod read;
pub mod result;
mod script;
mod write;

pub use result::{OperationResult, to_operation_result};
pub use script::rewrite_object_ids;

/// Resolves shell query strings against one client
#[derive(Clone, Debug)]
pub struct QueryResolver {
    client: Client,

    /// Database used when the query names none
    default_database: Option<Database>,

    /// Whether `;`-terminated statements may run through server-side `eval`
    allow_server_eval: bool,
}

impl QueryResolver {
    /// Create a resolver
    ///
    /// # Arguments
    /// * `client` - Shared backend client
    /// * `default_database` - Database name used when a query has no override
    pub fn new(client: Client, default_database: Option<&str>) -> Self {
        let default_database = default_database
            .filter(|name| !name.trim().is_empty())
            .map(|name| client.database(name));
        Self {
            client,
            default_database,
            allow_server_eval: false,
        }
    }

    /// Enable or disable the server-side evaluation path
    pub fn with_server_eval(mut self, allow: bool) -> Self {
        self.allow_server_eval = allow;
        self
    }

    /// Parse and execute a query string
    pub async fn resolve(&self, query: &str) -> Result<Value> {
        match CallParser::parse(query)? {
            ParsedQuery::Call(call) => self.execute(&call).await,
            ParsedQuery::Script(script) => self.evaluate_script(&script).await,
        }
    }

    /// Execute an already parsed call
    pub async fn execute(&self, call: &CallDescriptor) -> Result<Value> {
        let database = self.database(call.database.as_deref())?;
        let coll: Collection<Document> = database.collection(&call.collection);

        debug!(
            "Executing {} on '{}.{}' with {} parameter(s)",
            call.operation,
            database.name(),
            call.collection,
            call.parameters.len()
        );

        match call.operation {
            Operation::Find => self.execute_find(&coll, call).await,
            Operation::FindAndModify => self.execute_find_and_modify(&coll, call).await,
            Operation::Aggregate => self.execute_aggregate(&coll, call).await,
            Operation::Insert => self.execute_insert(&coll, call).await,
            Operation::Update => self.execute_update(&coll, call).await,
            Operation::Remove => self.execute_remove(&coll, call).await,
            Operation::Save => Err(ExecutionError::UnsupportedOperation(
                "save is not supported, use insert or update".to_string(),
            )
            .into()),
        }
    }

    /// Database for an optional override name
    fn database(&self, name: Option<&str>) -> Result<Database> {
        match name {
            Some(name) => Ok(self.client.database(name)),
            None => self.default_database.clone().ok_or_else(|| {
                ExecutionError::InvalidParameters(
                    "no database selected: name one in the query or configure a default"
                        .to_string(),
                )
                .into()
            }),
        }
    }
}

/// Parameter `index` as a BSON document
///
/// Missing or non-object parameters are reported as invalid parameters of the
/// call's operation.
fn document_param(call: &CallDescriptor, index: usize, what: &str) -> Result<Document> {
    match call.parameter(index) {
        Some(value @ Value::Object(_)) => codec::to_document(value),
        Some(other) => Err(ExecutionError::InvalidParameters(format!(
            "{} expects {what} as parameter {}, found {other}",
            call.operation,
            index + 1
        ))
        .into()),
        None => Err(ExecutionError::InvalidParameters(format!(
            "{} expects {what} as parameter {}",
            call.operation,
            index + 1
        ))
        .into()),
    }
}

/// Shell truthiness of an option flag
///
/// Booleans are taken as is, numbers are true when non-zero and `null` is
/// false. Anything else is not a flag.
fn flag_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::Null => Some(false),
        _ => None,
    }
}

/// Reject calls with more parameters than the operation accepts
fn ensure_at_most(call: &CallDescriptor, max: usize) -> Result<()> {
    if call.parameters.len() > max {
        return Err(ExecutionError::InvalidParameters(format!(
            "{} accepts at most {max} parameter(s), got {}",
            call.operation,
            call.parameters.len()
        ))
        .into());
    }
    Ok(())
}
