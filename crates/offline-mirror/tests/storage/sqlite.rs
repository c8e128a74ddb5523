//! Tests for the SQLite key-value store.

use offline_mirror::storage::{create_store, KeyValueStore, SqliteStore};

#[tokio::test]
async fn upsert_and_keys_in_insertion_order() {
    let kv = SqliteStore::open_in_memory().unwrap();
    let store = create_store("app_todos", "todos-store");
    kv.set("b", "1", &store).await.unwrap();
    kv.set("a", "2", &store).await.unwrap();
    kv.set("b", "3", &store).await.unwrap();

    assert_eq!(kv.keys(&store).await.unwrap(), vec!["b", "a"]);
    assert_eq!(kv.get("b", &store).await.unwrap().as_deref(), Some("3"));

    kv.del("b", &store).await.unwrap();
    kv.del("b", &store).await.unwrap();
    assert_eq!(kv.get("b", &store).await.unwrap(), None);
}

#[tokio::test]
async fn stores_are_isolated() {
    let kv = SqliteStore::open_in_memory().unwrap();
    let a = create_store("db", "a");
    let b = create_store("db", "b");
    kv.set("k", "v", &a).await.unwrap();
    assert_eq!(kv.get("k", &b).await.unwrap(), None);
    assert!(kv.keys(&b).await.unwrap().is_empty());
}

#[tokio::test]
async fn data_survives_reopen() {
    let path = std::env::temp_dir().join(format!("offline-mirror-{}.db", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();
    let store = create_store("db", "docs");
    {
        let kv = SqliteStore::open(&path).unwrap();
        kv.set("k", "v", &store).await.unwrap();
    }
    let kv = SqliteStore::open(&path).unwrap();
    assert_eq!(kv.get("k", &store).await.unwrap().as_deref(), Some("v"));
    drop(kv);
    let _ = std::fs::remove_file(&path);
}
