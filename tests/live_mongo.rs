//! Tests against a running MongoDB deployment
//!
//! Ignored by default. Run with:
//!
//! ```bash
//! MONGODB_URI=mongodb://localhost:27017 cargo test --test live_mongo -- --ignored
//! ```

use mongo_resolver::config::Settings;
use mongo_resolver::connection::ConnectionProvider;
use mongo_resolver::controller::{MongoPersistenceController, PersistenceController};
use mongo_resolver::executor::to_operation_result;
use mongo_resolver::{NormalizeMode, QueryResolver, normalize};
use mongodb::Client;
use mongodb::bson::oid::ObjectId;
use serde_json::{Value, json};
use tokio::runtime::Handle;

const DATABASE: &str = "mongo_resolver_test";

fn uri() -> String {
    std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
}

async fn resolver() -> QueryResolver {
    let client = Client::with_uri_str(uri()).await.unwrap();
    QueryResolver::new(client, Some(DATABASE))
}

/// Fresh collection name per test so runs do not interfere
fn collection() -> String {
    format!("c_{}", ObjectId::new().to_hex())
}

async fn seed(resolver: &QueryResolver, coll: &str, count: usize) {
    let docs: Vec<Value> = (0..count)
        .map(|seq| json!({ "seq": seq, "age": 20 + seq * 5, "name": format!("user{seq}") }))
        .collect();
    let query = format!("db.{coll}.insert({})", Value::Array(docs));
    resolver.resolve(&query).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_find_limit_and_skip() {
    let resolver = resolver().await;
    let coll = collection();
    seed(&resolver, &coll, 6).await;

    let all = resolver.resolve(&format!("db.{coll}.find()")).await.unwrap();
    assert_eq!(all.as_array().unwrap().len(), 6);

    let page = resolver
        .resolve(&format!("db.{coll}.find({{}}).skip(2).limit(2)"))
        .await
        .unwrap();
    let page = page.as_array().unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["seq"], json!(2));

    let filtered = resolver
        .resolve(&format!(r#"db.{coll}.find({{"age":{{"$gt":30}}}},{{"name":1}}).limit(2)"#))
        .await
        .unwrap();
    let filtered = filtered.as_array().unwrap();
    assert!(filtered.len() <= 2);
    for doc in filtered {
        let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
        assert!(keys.iter().all(|k| *k == "_id" || *k == "name"));
    }
}

#[tokio::test]
#[ignore]
async fn test_update_plain_fields_equal_set() {
    let resolver = resolver().await;
    let coll = collection();
    seed(&resolver, &coll, 2).await;

    resolver
        .resolve(&format!(r#"db.{coll}.update({{"seq":0}},{{"a":1,"b":2}})"#))
        .await
        .unwrap();
    resolver
        .resolve(&format!(r#"db.{coll}.update({{"seq":1}},{{"$set":{{"a":1,"b":2}}}})"#))
        .await
        .unwrap();

    let docs = resolver
        .resolve(&format!(r#"db.{coll}.find({{}},{{"_id":0,"a":1,"b":1,"name":1}})"#))
        .await
        .unwrap();
    let docs = docs.as_array().unwrap();
    assert_eq!(docs[0], json!({"name": "user0", "a": 1, "b": 2}));
    assert_eq!(docs[1], json!({"name": "user1", "a": 1, "b": 2}));
}

#[tokio::test]
#[ignore]
async fn test_insert_reports_keys_in_order() {
    let resolver = resolver().await;
    let coll = collection();

    let result = resolver
        .resolve(&format!(r#"db.{coll}.insert([{{"n":1}},{{"n":2}},{{"n":3}}])"#))
        .await
        .unwrap();
    let result = to_operation_result(result, false).unwrap().unwrap();
    assert_eq!(result.manipulation_count, 3);
    assert_eq!(result.affected_keys.len(), 3);

    let docs = resolver.resolve(&format!("db.{coll}.find()")).await.unwrap();
    let docs = normalize(docs, NormalizeMode::IdOnly);
    let ids: Vec<String> = docs
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, result.affected_keys);
}

#[tokio::test]
#[ignore]
async fn test_remove_all_and_just_one() {
    let resolver = resolver().await;
    let coll = collection();
    seed(&resolver, &coll, 5).await;

    let one = resolver
        .resolve(&format!(r#"db.{coll}.remove({{}},{{"justOne":true}})"#))
        .await
        .unwrap();
    assert_eq!(one["manipulationCount"], json!(1));

    let rest = resolver.resolve(&format!("db.{coll}.remove()")).await.unwrap();
    assert_eq!(rest["manipulationCount"], json!(4));

    let left = resolver.resolve(&format!("db.{coll}.find()")).await.unwrap();
    assert!(left.as_array().unwrap().is_empty());
}

#[tokio::test]
#[ignore]
async fn test_find_and_modify_and_aggregate() {
    let resolver = resolver().await;
    let coll = collection();
    seed(&resolver, &coll, 3).await;

    let updated = resolver
        .resolve(&format!(
            r#"db.{coll}.findAndModify({{"query":{{"seq":1}},"update":{{"flag":true}},"new":true}})"#
        ))
        .await
        .unwrap();
    assert_eq!(updated["flag"], json!(true));

    let total = resolver
        .resolve(&format!(
            r#"db.{coll}.aggregate([{{"$group":{{"_id":null,"total":{{"$sum":"$seq"}}}}}}])"#
        ))
        .await
        .unwrap();
    assert_eq!(total["total"], json!(3));

    let removed = resolver
        .resolve(&format!(
            r#"db.{coll}.findAndModify({{"query":{{"seq":2}},"remove":true}})"#
        ))
        .await
        .unwrap();
    assert_eq!(removed["seq"], json!(2));
}

#[tokio::test]
#[ignore]
async fn test_controller_round_trip() {
    let settings = Settings::from_value(json!({
        "persistence": { "url": uri(), "database": DATABASE, "normalizeIdFields": true }
    }))
    .unwrap();
    let handle = Handle::current();
    let provider = ConnectionProvider::new();
    let controller = MongoPersistenceController::init(&provider, &settings, &handle)
        .await
        .unwrap();
    let coll = collection();

    let inserted = controller
        .update(&format!(r#"db.{coll}.insert({{"name":"Ann"}})"#), &handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(inserted.manipulation_count, 1);

    let found = controller
        .query(&format!(r#"db.{coll}.find({{"name":"Ann"}})"#), &handle)
        .await
        .unwrap();
    assert_eq!(found[0]["id"], json!(inserted.affected_keys[0]));
    assert!(found[0].get("_id").is_none());

    controller.close(&handle).await.unwrap();
    assert!(controller.query("db.users.find()", &handle).await.is_err());
}
