//! Tests for the in-memory key-value store.

use std::sync::Arc;

use offline_mirror::storage::{create_store, KeyValueStore, MemoryStore, StoreHandle};

#[tokio::test]
async fn trait_object_round_trip() {
    let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let store = create_store("app_todos", "todos-store");

    assert_eq!(kv.get("a", &store).await.unwrap(), None);
    kv.set("a", "1", &store).await.unwrap();
    kv.set("b", "2", &store).await.unwrap();
    kv.set("a", "3", &store).await.unwrap();

    assert_eq!(kv.get("a", &store).await.unwrap().as_deref(), Some("3"));
    assert_eq!(kv.keys(&store).await.unwrap(), vec!["a", "b"]);

    kv.del("a", &store).await.unwrap();
    assert_eq!(kv.keys(&store).await.unwrap(), vec!["b"]);
}

#[tokio::test]
async fn document_and_control_stores_do_not_overlap() {
    let kv = MemoryStore::new();
    let docs = StoreHandle::documents("app", "todos");
    let control = StoreHandle::control("app", "todos");
    kv.set("config", "{}", &control).await.unwrap();
    assert!(kv.keys(&docs).await.unwrap().is_empty());
    assert_eq!(kv.len(&control), 1);
}
