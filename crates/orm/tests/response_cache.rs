use std::sync::Arc;

use convex_orm::{
    testing::{MockTransport, SequentialIds},
    CacheMode, Client, ConvexConfig, DurableStore, FileStore, MemoryStore, ModelDefinition,
    Registry, Request, RequestConfig, RequestOptions,
};
use serde_json::json;

fn registry_with_store(store: Arc<dyn DurableStore>) -> (Registry, Arc<MockTransport>) {
    let transport = Arc::new(MockTransport::new());
    let client = Client::builder(ConvexConfig::testing())
        .transport(transport.clone())
        .id_generator(Arc::new(SequentialIds::new("tmp")))
        .store(store)
        .build()
        .unwrap();
    (Registry::new(client), transport)
}

#[tokio::test]
async fn test_persisted_responses_survive_a_new_client() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");

    {
        let store = Arc::new(FileStore::open(&path).unwrap());
        let (registry, transport) = registry_with_store(store);
        transport.respond_ok(json!([{"id": 1}]));

        let request = Request::new(RequestConfig::get("/items").with_cache(CacheMode::Persist));
        request.send(registry.client()).await.unwrap();
        assert_eq!(transport.requests().len(), 1);
    }

    let store = Arc::new(FileStore::open(&path).unwrap());
    let (registry, transport) = registry_with_store(store);
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    let collection = item
        .all(RequestOptions::new().cache(CacheMode::Persist))
        .await
        .unwrap();

    assert_eq!(collection.ids(), vec!["1".to_string()]);
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_memory_cache_is_per_url() {
    let (registry, transport) = registry_with_store(Arc::new(MemoryStore::new()));
    let item = registry.define(ModelDefinition::new("item")).unwrap();

    transport.respond_ok(json!([{"id": 1}]));
    transport.respond_ok(json!([{"id": 2}]));

    let options = || RequestOptions::new().cache(CacheMode::Memory);
    item.where_(json!({"page": 1}), options()).await.unwrap();
    item.where_(json!({"page": 1}), options()).await.unwrap();
    let second_page = item.where_(json!({"page": 2}), options()).await.unwrap();

    assert_eq!(transport.requests().len(), 2);
    assert_eq!(second_page.ids(), vec!["2".to_string()]);
}

#[tokio::test]
async fn test_destroy_sweeps_only_own_keys() {
    let store = Arc::new(MemoryStore::new());
    store.set_item("someone-else", "\"keep\"");

    let (registry, transport) = registry_with_store(store.clone());
    transport.respond_ok(json!({"ok": true}));

    Request::new(RequestConfig::get("/status").with_cache(CacheMode::Persist))
        .send(registry.client())
        .await
        .unwrap();
    assert!(store.contains("convex-responses:https://api.test/status"));

    registry.destroy();
    assert!(!store.contains("convex-responses:https://api.test/status"));
    assert!(store.contains("someone-else"));
}

#[tokio::test]
async fn test_non_get_requests_are_never_cached() {
    let (registry, transport) = registry_with_store(Arc::new(MemoryStore::new()));
    transport.respond_ok(json!({"id": 1}));
    transport.respond_ok(json!({"id": 1}));

    let config = RequestConfig::post("/items").with_cache(CacheMode::Memory);
    Request::new(config.clone()).send(registry.client()).await.unwrap();
    Request::new(config).send(registry.client()).await.unwrap();

    assert_eq!(transport.requests().len(), 2);
    assert!(registry.client().responses().is_empty());
}
