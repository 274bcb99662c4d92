//! Shell call parser
//!
//! Decomposes a MongoDB shell-style invocation into its parts:
//!
//! ```text
//! db.shop.orders.find({"status":"open"},{"total":1}).limit(5)
//!    ^^^^ ^^^^^^ ^^^^ ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ ^^^^^^^^^
//!    |    |      |    parameter block                modifier tail
//!    |    |      operation
//!    |    collection
//!    optional database override
//! ```
//!
//! The module is split into:
//! - `scanner`: balanced-bracket matching used to delimit argument blocks
//! - `operation`: the fixed operation table
//! - `chain`: `.limit()` / `.skip()` modifier tails
//!
//! A query ending in `;` is not a call at all but a script; it is returned as
//! [`ParsedQuery::Script`] and handled separately by the executor.
//!
//! # Examples
//!
//! ```
//! use mongo_resolver::parser::{CallParser, Operation, ParsedQuery};
//!
//! let parsed = CallParser::parse(r#"db.users.find({"age":{"$gt":30}}).limit(2)"#).unwrap();
//! if let ParsedQuery::Call(call) = parsed {
//!     assert_eq!(call.collection, "users");
//!     assert_eq!(call.operation, Operation::Find);
//!     assert_eq!(call.parameters.len(), 1);
//! }
//! ```

mod chain;
mod operation;
mod scanner;

pub use chain::{ChainCall, Modifiers, split_chain};
pub use operation::Operation;
pub use scanner::matching_close;

use serde_json::Value;
use tracing::debug;

use crate::error::{ParseError, Result};

/// Prefix naming the database root in shell syntax
const DB_ROOT_PREFIX: &str = "db.";

/// Parsed representation of one structured shell call
#[derive(Debug, Clone, PartialEq)]
pub struct CallDescriptor {
    /// Database named explicitly in the call, overriding the default one
    pub database: Option<String>,
    pub collection: String,
    pub operation: Operation,
    /// Arguments of the primary call, in order
    pub parameters: Vec<Value>,
    /// Raw text after the primary call, e.g. `.limit(2).skip(1)`
    pub modifier_tail: String,
}

/// A `;`-terminated statement to be evaluated server-side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCall {
    pub database: Option<String>,
    pub collection: String,
    /// The statement exactly as supplied
    pub script: String,
}

/// Outcome of parsing a query string
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedQuery {
    Call(CallDescriptor),
    Script(ScriptCall),
}

impl CallDescriptor {
    /// Cursor modifiers from the tail
    pub fn modifiers(&self) -> Result<Modifiers> {
        Modifiers::from_tail(&self.modifier_tail)
    }

    /// Parameter at `index`, if present
    pub fn parameter(&self, index: usize) -> Option<&Value> {
        self.parameters.get(index)
    }
}

/// Parser for shell call strings
pub struct CallParser;

impl CallParser {
    /// Parse a query string into a call descriptor or a script
    ///
    /// # Arguments
    /// * `query` - Shell-style query text
    ///
    /// # Returns
    /// * `Result<ParsedQuery>` - Parsed query, or `MalformedQuery` / `UnsupportedOperation`
    pub fn parse(query: &str) -> Result<ParsedQuery> {
        let trimmed = query.trim();
        let body = strip_db_root(trimmed);

        let paren = body.find('(').ok_or_else(|| {
            ParseError::MalformedQuery("expected '(' after the operation name".to_string())
        })?;

        let segments: Vec<&str> = body[..paren].split('.').map(str::trim).collect();
        // Collection names may contain dots: everything between the database
        // and the operation is the collection.
        let (database, collection) = if segments.len() > 2 {
            (
                Some(segments[0].to_string()),
                segments[1..segments.len() - 1].join("."),
            )
        } else {
            (None, segments[0].to_string())
        };

        if collection.split('.').any(str::is_empty) {
            return Err(ParseError::MalformedQuery("missing collection name".to_string()).into());
        }
        if let Some(db) = &database {
            if db.is_empty() {
                return Err(ParseError::MalformedQuery("empty database name".to_string()).into());
            }
        }

        if trimmed.ends_with(';') {
            return Ok(ParsedQuery::Script(ScriptCall {
                database,
                collection,
                script: trimmed.to_string(),
            }));
        }

        if segments.len() < 2 {
            return Err(ParseError::MalformedQuery(format!(
                "missing operation name after collection '{collection}'"
            ))
            .into());
        }
        let name = segments[segments.len() - 1];
        if name.is_empty() {
            return Err(ParseError::MalformedQuery("missing operation name".to_string()).into());
        }
        let operation: Operation = name.parse()?;

        let close = matching_close(body, paren)?;
        let parameters = parse_parameter_block(&body[paren + 1..close])?;
        let modifier_tail = body[close + 1..].trim().to_string();

        let call = CallDescriptor {
            database,
            collection,
            operation,
            parameters,
            modifier_tail,
        };
        debug!(
            "Parsed call: collection='{}' operation='{}' parameters={} tail='{}'",
            call.collection,
            call.operation,
            call.parameters.len(),
            call.modifier_tail
        );
        Ok(ParsedQuery::Call(call))
    }

    /// Parse a query that must be a structured call
    pub fn parse_call(query: &str) -> Result<CallDescriptor> {
        match Self::parse(query)? {
            ParsedQuery::Call(call) => Ok(call),
            ParsedQuery::Script(_) => Err(ParseError::MalformedQuery(
                "expected a call, found a ';'-terminated statement".to_string(),
            )
            .into()),
        }
    }
}

fn strip_db_root(query: &str) -> &str {
    match query.get(..DB_ROOT_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(DB_ROOT_PREFIX) => {
            &query[DB_ROOT_PREFIX.len()..]
        }
        _ => query,
    }
}

/// Parse the text between the call parentheses as a JSON argument list
fn parse_parameter_block(block: &str) -> Result<Vec<Value>> {
    if block.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Vec<Value>>(&format!("[{block}]"))
        .map_err(|e| ParseError::InvalidParameters(e.to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(query: &str) -> CallDescriptor {
        CallParser::parse_call(query).unwrap()
    }

    #[test]
    fn test_parse_find_with_projection_and_limit() {
        let parsed = call(r#"db.users.find({"age":{"$gt":30}},{"name":1}).limit(2)"#);
        assert_eq!(parsed.database, None);
        assert_eq!(parsed.collection, "users");
        assert_eq!(parsed.operation, Operation::Find);
        assert_eq!(
            parsed.parameters,
            vec![json!({"age": {"$gt": 30}}), json!({"name": 1})]
        );
        assert!(parsed.modifier_tail.contains(".limit(2)"));
        assert_eq!(parsed.modifiers().unwrap().limit, Some(2));
    }

    #[test]
    fn test_parse_without_db_prefix() {
        let parsed = call(r#"orders.remove({"status":"closed"})"#);
        assert_eq!(parsed.collection, "orders");
        assert_eq!(parsed.operation, Operation::Remove);
    }

    #[test]
    fn test_db_prefix_is_case_insensitive() {
        let parsed = call("DB.users.find()");
        assert_eq!(parsed.collection, "users");
    }

    #[test]
    fn test_database_override() {
        let parsed = call(r#"db.shop.orders.find({})"#);
        assert_eq!(parsed.database.as_deref(), Some("shop"));
        assert_eq!(parsed.collection, "orders");
        assert_eq!(parsed.operation, Operation::Find);
    }

    #[test]
    fn test_dotted_collection_name() {
        let parsed = call(r#"db.shop.orders.archive.find({})"#);
        assert_eq!(parsed.database.as_deref(), Some("shop"));
        assert_eq!(parsed.collection, "orders.archive");
        assert_eq!(parsed.operation, Operation::Find);

        let err = CallParser::parse("db.shop..archive.find()").unwrap_err();
        assert!(err.is_malformed_query());
    }

    #[test]
    fn test_empty_parameter_block() {
        let parsed = call("db.users.find()");
        assert!(parsed.parameters.is_empty());
        assert!(parsed.modifier_tail.is_empty());
    }

    #[test]
    fn test_empty_parameters_keep_modifier_tail() {
        let parsed = call("db.users.find().skip(1).limit(3)");
        assert!(parsed.parameters.is_empty());
        let modifiers = parsed.modifiers().unwrap();
        assert_eq!(modifiers.limit, Some(3));
        assert_eq!(modifiers.skip, Some(1));
    }

    #[test]
    fn test_deeply_nested_filter_is_not_truncated() {
        let parsed = call(
            r#"db.events.find({"a":{"b":{"c":{"$in":[{"d":1},{"e":{"f":2}}]}}}}, {"a":1})"#,
        );
        assert_eq!(parsed.parameters.len(), 2);
        assert_eq!(parsed.parameters[0]["a"]["b"]["c"]["$in"][1]["e"]["f"], json!(2));
        assert_eq!(parsed.parameters[1], json!({"a": 1}));
    }

    #[test]
    fn test_whitespace_and_newlines() {
        let parsed = call("db.users.update(\n  {\"name\": \"Ann\"},\n\t{\"age\": 31}\n)  ");
        assert_eq!(parsed.operation, Operation::Update);
        assert_eq!(parsed.parameters.len(), 2);
        assert!(parsed.modifier_tail.is_empty());
    }

    #[test]
    fn test_array_parameter_is_kept_as_one_parameter() {
        let parsed = call(r#"db.users.insert([{"a":1},{"a":2}])"#);
        assert_eq!(parsed.parameters.len(), 1);
        assert_eq!(parsed.parameters[0].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_oid_wrapper_survives_parsing() {
        let parsed = call(r#"db.users.find({"_id":{"$oid":"5f1d7f0e2c8b9a0012345678"}})"#);
        assert_eq!(
            parsed.parameters[0],
            json!({"_id": {"$oid": "5f1d7f0e2c8b9a0012345678"}})
        );
    }

    #[test]
    fn test_script_statement() {
        let parsed = CallParser::parse(r#"db.users.find({"a":1}).forEach(printjson);"#).unwrap();
        match parsed {
            ParsedQuery::Script(script) => {
                assert_eq!(script.collection, "users");
                assert!(script.script.ends_with(';'));
            }
            other => panic!("Expected script, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_call_rejects_script() {
        assert!(CallParser::parse_call("db.users.find();").is_err());
    }

    #[test]
    fn test_missing_parenthesis() {
        let err = CallParser::parse("db.users.find").unwrap_err();
        assert!(err.is_malformed_query());
    }

    #[test]
    fn test_missing_operation() {
        let err = CallParser::parse("db.users({})").unwrap_err();
        assert!(err.is_malformed_query());
    }

    #[test]
    fn test_missing_collection() {
        assert!(CallParser::parse("db..find()").is_err());
        assert!(CallParser::parse("(1)").is_err());
    }

    #[test]
    fn test_unknown_operation_fails_at_parse_time() {
        let err = CallParser::parse("db.users.drop()").unwrap_err();
        assert!(err.is_unsupported_operation());
    }

    #[test]
    fn test_invalid_json_parameters() {
        let err = CallParser::parse("db.users.find({name: 'Ann'})").unwrap_err();
        assert!(err.is_malformed_query());
    }

    #[test]
    fn test_unbalanced_parameters() {
        let err = CallParser::parse(r#"db.users.find({"a":{"b":1})"#).unwrap_err();
        assert!(err.is_malformed_query());
    }
}
