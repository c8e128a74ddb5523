//! Tests for rebuilding the in-memory collection from the durable store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use offline_mirror::codec;
use offline_mirror::error::StorageError;
use offline_mirror::facade::SubscriptionHandle;
use offline_mirror::storage::{KeyValueStore, MemoryStore, StoreHandle};
use offline_mirror::{Document, MirrorCollection, MirrorOptions, Origin};
use serde_json::{json, Value};

fn d(v: Value) -> Document {
    v.as_object().cloned().unwrap()
}

async fn open(kv: &Arc<MemoryStore>) -> MirrorCollection {
    let store: Arc<dyn KeyValueStore> = kv.clone();
    MirrorCollection::open("todos", MirrorOptions::new("app"), store).await.unwrap()
}

#[tokio::test]
async fn forced_rehydrate_restores_documents_with_dates() {
    let kv = Arc::new(MemoryStore::new());
    let due = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    {
        let m = open(&kv).await;
        m.insert(d(json!({ "_id": "a", "due": codec::date_value(due) })), Origin::Local)
            .await
            .unwrap();
        m.insert(d(json!({ "_id": "b" })), Origin::RemoteSync).await.unwrap();
    }

    let m = open(&kv).await;
    assert!(m.is_empty());
    assert!(!m.is_initialized());

    assert!(m.rehydrate(true).await.unwrap());
    assert!(m.is_initialized());
    assert_eq!(m.len(), 2);
    let a = m.get("a").unwrap();
    assert_eq!(codec::as_date(&a["due"]), Some(due));
    assert!(codec::as_date(&a["lastupdate"]).is_some());
}

#[tokio::test]
async fn unforced_rehydrate_is_debounced() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(&kv).await;
    assert!(m.rehydrate(false).await.unwrap());

    kv.set("late", r#"{"_id":"late"}"#, m.store_handle()).await.unwrap();
    assert!(!m.rehydrate(false).await.unwrap());
    assert!(m.get("late").is_none());

    assert!(m.rehydrate(true).await.unwrap());
    assert!(m.get("late").is_some());
}

#[tokio::test]
async fn zero_debounce_always_rebuilds() {
    let kv = Arc::new(MemoryStore::new());
    let store: Arc<dyn KeyValueStore> = kv.clone();
    let options = MirrorOptions::new("app").with_rehydrate_debounce_secs(0);
    let m = MirrorCollection::open("todos", options, store).await.unwrap();
    assert!(m.rehydrate(false).await.unwrap());
    assert!(m.rehydrate(false).await.unwrap());
}

#[tokio::test]
async fn unreadable_entries_are_skipped() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(&kv).await;
    kv.set("good", r#"{"title":"ok"}"#, m.store_handle()).await.unwrap();
    kv.set("bad", "{oops", m.store_handle()).await.unwrap();

    assert!(m.rehydrate(true).await.unwrap());
    assert_eq!(m.len(), 1);
    assert_eq!(m.get("good").unwrap()["_id"], json!("good"));
}

#[tokio::test]
async fn initialized_receiver_flips_after_rebuild() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(&kv).await;
    let mut initialized = m.initialized();
    assert!(!*initialized.borrow());

    m.rehydrate(true).await.unwrap();
    initialized.wait_for(|ready| *ready).await.unwrap();

    m.close();
    assert!(!m.is_initialized());
    assert!(m.rehydrate(true).await.is_err());
}

/// Store whose key listing can be made to fail.
#[derive(Default)]
struct UnlistableStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

#[async_trait]
impl KeyValueStore for UnlistableStore {
    async fn get(&self, key: &str, store: &StoreHandle) -> offline_mirror::Result<Option<String>> {
        self.inner.get(key, store).await
    }

    async fn set(&self, key: &str, value: &str, store: &StoreHandle) -> offline_mirror::Result<()> {
        self.inner.set(key, value, store).await
    }

    async fn del(&self, key: &str, store: &StoreHandle) -> offline_mirror::Result<()> {
        self.inner.del(key, store).await
    }

    async fn keys(&self, store: &StoreHandle) -> offline_mirror::Result<Vec<String>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::backend(&store.database, &store.store, "disk unavailable").into());
        }
        self.inner.keys(store).await
    }
}

#[tokio::test]
async fn failed_rehydrate_leaves_collection_uninitialized() {
    let kv = Arc::new(UnlistableStore::default());
    let store: Arc<dyn KeyValueStore> = kv.clone();
    let m = MirrorCollection::open("todos", MirrorOptions::new("app"), store).await.unwrap();
    m.insert(d(json!({ "_id": "a" })), Origin::Local).await.unwrap();
    assert!(m.rehydrate(true).await.unwrap());
    let handle = SubscriptionHandle::Cached(m.initialized());
    assert!(handle.ready());

    kv.failing.store(true, Ordering::SeqCst);
    assert!(m.rehydrate(true).await.is_err());
    assert!(!m.is_initialized());
    assert!(!handle.ready());

    kv.failing.store(false, Ordering::SeqCst);
    assert!(m.rehydrate(true).await.unwrap());
    assert!(handle.ready());
    assert!(m.get("a").is_some());
}
