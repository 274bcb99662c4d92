//! Read operations: find and aggregate

use futures::stream::TryStreamExt;
use mongodb::Collection;
use mongodb::bson::Document;
use mongodb::options::FindOptions;
use serde_json::Value;
use tracing::debug;

use crate::codec;
use crate::error::Result;
use crate::parser::CallDescriptor;

use super::{document_param, ensure_at_most};

/// Read operations implementation
impl super::QueryResolver {
    /// Execute find
    ///
    /// Zero parameters match everything, one is a filter, a second is a
    /// projection applied only when it names at least one field. `limit` and
    /// `skip` come from the modifier tail.
    ///
    /// # Returns
    /// * `Result<Value>` - Array of matching documents
    pub(super) async fn execute_find(
        &self,
        coll: &Collection<Document>,
        call: &CallDescriptor,
    ) -> Result<Value> {
        let (filter, find_options) = find_request(call)?;

        debug!(
            "find on '{}' filter={:?} limit={:?} skip={:?}",
            coll.name(),
            filter,
            find_options.limit,
            find_options.skip
        );

        let cursor = coll.find(filter).with_options(find_options).await?;
        let documents: Vec<Document> = cursor.try_collect().await?;

        Ok(Value::Array(
            documents
                .into_iter()
                .map(|doc| codec::to_value(Some(doc)))
                .collect(),
        ))
    }

    /// Execute aggregate
    ///
    /// A single array parameter is the pipeline; otherwise each parameter is
    /// one stage.
    ///
    /// # Returns
    /// * `Result<Value>` - First output document of the pipeline, or `null`
    pub(super) async fn execute_aggregate(
        &self,
        coll: &Collection<Document>,
        call: &CallDescriptor,
    ) -> Result<Value> {
        let pipeline = pipeline_stages(call)?;

        debug!(
            "aggregate on '{}' with {} stage(s)",
            coll.name(),
            pipeline.len()
        );

        let mut cursor = coll.aggregate(pipeline).await?;
        let first = cursor.try_next().await?;
        Ok(codec::to_value(first))
    }
}

/// Filter and driver options of a find call
///
/// A projection is only set when the second parameter names at least one field.
fn find_request(call: &CallDescriptor) -> Result<(Document, FindOptions)> {
    ensure_at_most(call, 2)?;

    let filter = match call.parameter(0) {
        Some(_) => document_param(call, 0, "a filter document")?,
        None => Document::new(),
    };
    let projection = match call.parameter(1) {
        Some(Value::Object(fields)) if !fields.is_empty() => {
            Some(document_param(call, 1, "a projection document")?)
        }
        _ => None,
    };
    let modifiers = call.modifiers()?;

    let mut find_options = FindOptions::default();
    find_options.projection = projection;
    find_options.limit = modifiers.limit;
    find_options.skip = modifiers.skip;

    Ok((filter, find_options))
}

fn pipeline_stages(call: &CallDescriptor) -> Result<Vec<Document>> {
    match call.parameters.as_slice() {
        [Value::Array(stages)] => codec::to_documents(stages),
        stages => codec::to_documents(stages),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CallParser;
    use mongodb::bson::doc;

    #[test]
    fn test_find_request_with_projection_and_limit() {
        let call = CallParser::parse_call(
            r#"db.users.find({"age":{"$gt":30}},{"name":1}).limit(2)"#,
        )
        .unwrap();
        let (filter, options) = find_request(&call).unwrap();
        assert_eq!(filter, doc! { "age": { "$gt": 30 } });
        assert_eq!(options.projection, Some(doc! { "name": 1 }));
        assert_eq!(options.limit, Some(2));
        assert_eq!(options.skip, None);
    }

    #[test]
    fn test_find_request_ignores_empty_projection() {
        let call = CallParser::parse_call(r#"db.users.find({"a":1},{}).skip(3)"#).unwrap();
        let (filter, options) = find_request(&call).unwrap();
        assert_eq!(filter, doc! { "a": 1 });
        assert_eq!(options.projection, None);
        assert_eq!(options.skip, Some(3));
        assert_eq!(options.limit, None);
    }

    #[test]
    fn test_find_request_without_parameters_matches_all() {
        let call = CallParser::parse_call("db.users.find().limit(5)").unwrap();
        let (filter, options) = find_request(&call).unwrap();
        assert!(filter.is_empty());
        assert_eq!(options.limit, Some(5));
    }

    #[test]
    fn test_find_request_rejects_bad_shapes() {
        for query in [
            r#"db.users.find({}, {}, {})"#,
            r#"db.users.find(5)"#,
            r#"db.users.find({}).limit("x")"#,
        ] {
            let call = CallParser::parse_call(query).unwrap();
            assert!(find_request(&call).is_err(), "{query}");
        }
    }

    #[test]
    fn test_pipeline_from_array_parameter() {
        let call = CallParser::parse_call(
            r#"db.orders.aggregate([{"$match":{"status":"A"}},{"$group":{"_id":"$cust","total":{"$sum":"$amount"}}}])"#,
        )
        .unwrap();
        let stages = pipeline_stages(&call).unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0], doc! { "$match": { "status": "A" } });
    }

    #[test]
    fn test_pipeline_from_spread_parameters() {
        let call =
            CallParser::parse_call(r#"db.orders.aggregate({"$match":{}}, {"$limit":1})"#).unwrap();
        let stages = pipeline_stages(&call).unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[1], doc! { "$limit": 1 });
    }

    #[test]
    fn test_pipeline_rejects_non_document_stage() {
        let call = CallParser::parse_call(r#"db.orders.aggregate([1])"#).unwrap();
        assert!(pipeline_stages(&call).is_err());
    }
}
