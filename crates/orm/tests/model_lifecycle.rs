use convex_orm::{
    testing::{expect_response_error, mock_registry},
    Method, ModelDefinition, ModelError, RequestOptions, TransportResponse,
};
use serde_json::{json, Value};

#[tokio::test]
async fn test_save_new_instance_posts_and_rekeys() {
    let (registry, transport) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let instance = item.create(json!({"name": "Ben"})).unwrap();
    let temporary = instance.id().unwrap();
    assert!(!instance.is_saved());

    transport.respond_ok(json!({"id": 42, "name": "Ben", "created": true}));
    let saved = instance.save(RequestOptions::new()).await.unwrap();

    assert!(saved == instance);
    assert!(instance.is_saved());
    assert_eq!(instance.id().as_deref(), Some("42"));
    assert_eq!(instance.get("created"), Some(json!(true)));

    let sent = transport.last_request().unwrap();
    assert_eq!(sent.method, Method::Post);
    assert_eq!(sent.url, "https://api.test/items");
    assert_eq!(sent.data, Some(json!({"id": temporary, "name": "Ben"})));

    assert!(item.cached("42").unwrap() == instance);
    assert!(item.cached(&temporary).is_none());
}

#[tokio::test]
async fn test_save_existing_instance_puts() {
    let (registry, transport) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let instance = item.create(json!({"id": 1, "name": "Ben"})).unwrap();
    transport.respond_ok(json!({"id": 1, "name": "Ben Drucker"}));
    instance.save(RequestOptions::new()).await.unwrap();

    let sent = transport.last_request().unwrap();
    assert_eq!(sent.method, Method::Put);
    assert_eq!(sent.url, "https://api.test/items/1");
    assert_eq!(instance.get("name"), Some(json!("Ben Drucker")));
}

#[tokio::test]
async fn test_fetch_merges_response() {
    let (registry, transport) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let instance = item.create(json!({"id": 1})).unwrap();
    transport.respond_ok(json!({"id": 1, "name": "Ben"}));

    instance
        .fetch(RequestOptions::new().expand("user"))
        .await
        .unwrap();

    assert_eq!(instance.get("name"), Some(json!("Ben")));
    let sent = transport.last_request().unwrap();
    assert_eq!(sent.method, Method::Get);
    assert_eq!(sent.url, "https://api.test/items/1?expand=user");
}

#[tokio::test]
async fn test_fetch_unsaved_does_no_io() {
    let (registry, transport) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let instance = item.create(Value::Null).unwrap();
    let fetched = instance.fetch(RequestOptions::new()).await.unwrap();

    assert!(fetched == instance);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_failed_fetch_keeps_state() {
    let (registry, transport) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let instance = item.create(json!({"id": 1, "name": "Ben"})).unwrap();
    transport.respond(TransportResponse::new(
        404,
        json!({"error": "Not Found", "message": "item 1 is gone"}),
    ));

    let err = expect_response_error(instance.fetch(RequestOptions::new()).await.unwrap_err());
    assert_eq!(err.status_code, Some(404));
    assert_eq!(err.message, "item 1 is gone");
    assert_eq!(instance.get("name"), Some(json!("Ben")));
}

#[tokio::test]
async fn test_delete_saved_instance() {
    let (registry, transport) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let instance = item.create(json!({"id": 1, "name": "Ben"})).unwrap();
    transport.respond(TransportResponse::new(204, Value::Null));
    instance.delete(RequestOptions::new()).await.unwrap();

    let sent = transport.last_request().unwrap();
    assert_eq!(sent.method, Method::Delete);
    assert_eq!(sent.url, "https://api.test/items/1");

    assert!(instance.is_deleted());
    assert!(!instance.is_saved());
    assert!(instance.fields().is_empty());
    assert!(item.cached("1").is_none());

    assert!(matches!(
        instance.fetch(RequestOptions::new()).await,
        Err(ModelError::Deleted(_))
    ));
    assert!(matches!(
        instance.save(RequestOptions::new()).await,
        Err(ModelError::Deleted(_))
    ));
}

#[tokio::test]
async fn test_delete_unsaved_is_local() {
    let (registry, transport) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let instance = item.create(json!({"name": "draft"})).unwrap();
    let id = instance.id().unwrap();
    instance.delete(RequestOptions::new()).await.unwrap();

    assert!(transport.requests().is_empty());
    assert!(instance.is_deleted());
    assert!(instance.fields().is_empty());
    assert!(item.cached(&id).is_none());
}

#[tokio::test]
async fn test_deleted_instance_rejects_changes() {
    let (registry, _) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let instance = item.create(json!({"name": "draft"})).unwrap();
    instance.delete(RequestOptions::new()).await.unwrap();

    assert!(matches!(
        instance.set(json!({"name": "again"})),
        Err(ModelError::Deleted(_))
    ));
    assert!(matches!(
        instance.set_attribute("name", "again"),
        Err(ModelError::Deleted(_))
    ));
    assert!(instance.fields().is_empty());
}

#[tokio::test]
async fn test_failed_delete_keeps_instance() {
    let (registry, transport) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let instance = item.create(json!({"id": 1})).unwrap();
    transport.respond(TransportResponse::new(500, json!({"error": "Server Error"})));

    assert!(instance.delete(RequestOptions::new()).await.is_err());
    assert!(!instance.is_deleted());
    assert!(item.cached("1").is_some());
}

#[tokio::test]
async fn test_where_and_find() {
    let (registry, transport) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let existing = item.create(json!({"id": 1})).unwrap();

    transport.respond_ok(json!([{"id": 1, "name": "Ben"}, {"id": 2, "name": "Sam"}]));
    let populating = item.where_(json!({"name": "Ben"}), RequestOptions::new());
    assert!(populating.collection().is_empty());

    let collection = populating.await.unwrap();
    assert_eq!(collection.len(), 2);
    assert!(collection.first().unwrap() == existing);
    assert_eq!(existing.get("name"), Some(json!("Ben")));
    assert_eq!(
        transport.last_request().unwrap().url,
        "https://api.test/items?name=Ben"
    );

    transport.respond_ok(json!([{"id": 2}]));
    let found = item.find(json!({"name": "Sam"}), RequestOptions::new()).await.unwrap();
    assert_eq!(found.get("name"), Some(json!("Sam")));

    transport.respond_ok(json!([]));
    let missing = item.find(json!({"name": "Nobody"}), RequestOptions::new()).await;
    assert!(missing.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_query_expects_a_list() {
    let (registry, transport) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    transport.respond_ok(json!({"id": 1}));
    let err = expect_response_error(item.all(RequestOptions::new()).await.unwrap_err());
    assert_eq!(err.name, "Invalid Response");
}

#[tokio::test]
async fn test_concurrent_creates_share_identity() {
    let (registry, _) = mock_registry();
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|n| {
            let item = item.clone();
            tokio::spawn(async move { item.create(json!({"id": 7, "n": n})).unwrap() })
        })
        .collect();

    let mut instances = Vec::new();
    for handle in handles {
        instances.push(handle.await.unwrap());
    }

    assert!(instances.iter().all(|instance| *instance == instances[0]));
    assert_eq!(item.cache().len(), 1);
}
