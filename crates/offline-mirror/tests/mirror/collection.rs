//! Tests for intercepted mutations on a mirrored collection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use offline_mirror::error::{MirrorError, StorageError};
use offline_mirror::query::FindOptions;
use offline_mirror::storage::{KeyValueStore, MemoryStore, StoreHandle};
use offline_mirror::types::LAST_UPDATE_FIELD;
use offline_mirror::{Document, MirrorCollection, MirrorOptions, Origin, RemoveRequest};
use serde_json::{json, Value};

// ============================================================================
// Helpers
// ============================================================================

fn d(v: Value) -> Document {
    v.as_object().cloned().unwrap()
}

/// Store whose writes fail while `failing` is set.
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
        }
    }

    fn fail_writes(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check(&self, store: &StoreHandle) -> offline_mirror::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::backend(&store.database, &store.store, "quota exceeded").into());
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str, store: &StoreHandle) -> offline_mirror::Result<Option<String>> {
        self.inner.get(key, store).await
    }

    async fn set(&self, key: &str, value: &str, store: &StoreHandle) -> offline_mirror::Result<()> {
        self.check(store)?;
        self.inner.set(key, value, store).await
    }

    async fn del(&self, key: &str, store: &StoreHandle) -> offline_mirror::Result<()> {
        self.check(store)?;
        self.inner.del(key, store).await
    }

    async fn keys(&self, store: &StoreHandle) -> offline_mirror::Result<Vec<String>> {
        self.inner.keys(store).await
    }
}

async fn open(kv: Arc<MemoryStore>) -> MirrorCollection {
    MirrorCollection::open("todos", MirrorOptions::new("app"), kv)
        .await
        .unwrap()
}

// ============================================================================
// Insert
// ============================================================================

#[tokio::test]
async fn offline_insert_is_readable_and_queued() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(Arc::clone(&kv)).await;

    let id = m.insert(d(json!({ "title": "A" })), Origin::Local).await.unwrap().unwrap();

    let found = m.find(&json!({ "title": "A" }), &FindOptions::default()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0]["_id"], json!(id));
    assert!(found[0].get(LAST_UPDATE_FIELD).is_some());

    let pending = m.ledger().pending_update(&id).unwrap();
    assert_eq!(pending.doc["title"], json!("A"));
    assert!(kv.contains(&id, m.store_handle()));
    assert!(m.is_tracked(&id));
}

#[tokio::test]
async fn inserting_existing_id_fails_without_side_effects() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(kv).await;
    m.insert(d(json!({ "_id": "x", "v": 1 })), Origin::Local).await.unwrap();

    let err = m.insert(d(json!({ "_id": "x", "v": 2 })), Origin::Local).await.unwrap_err();
    assert!(matches!(err, MirrorError::Query(_)));
    assert_eq!(m.get("x").unwrap()["v"], json!(1));
    assert_eq!(m.ledger().pending_update("x").unwrap().doc["v"], json!(1));
}

#[tokio::test]
async fn local_insert_cancels_pending_removal() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(kv).await;
    m.insert(d(json!({ "_id": "x" })), Origin::Local).await.unwrap();
    m.remove(RemoveRequest::new("x"), Origin::Local).await.unwrap();
    assert!(m.ledger().is_removal_pending("x"));

    m.insert(d(json!({ "_id": "x", "back": true })), Origin::Local).await.unwrap();
    assert!(!m.ledger().is_removal_pending("x"));
    assert!(m.ledger().pending_update("x").is_some());
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn repeated_updates_keep_one_ledger_entry() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(kv).await;
    m.insert(d(json!({ "_id": "x", "v": 0 })), Origin::Local).await.unwrap();
    m.update(&json!("x"), &d(json!({ "$set": { "v": 1 } })), Origin::Local).await.unwrap();
    m.update(&json!("x"), &d(json!({ "$set": { "v": 2 } })), Origin::Local).await.unwrap();

    let record = m.ledger().snapshot();
    assert_eq!(record.updated_docs.len(), 1);
    assert_eq!(record.updated_docs["x"].doc["v"], json!(2));
}

#[tokio::test]
async fn update_of_missing_document_upserts() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(Arc::clone(&kv)).await;

    let returned = m
        .update(&json!({ "_id": "n", "owner": "ana" }), &d(json!({ "$set": { "v": 1 } })), Origin::Local)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(returned["_id"], json!("n"));
    assert_eq!(returned["owner"], json!("ana"));
    assert_eq!(returned["v"], json!(1));

    let stored = m.get("n").unwrap();
    assert_eq!(stored["v"], json!(1));
    assert!(kv.contains("n", m.store_handle()));
    assert!(m.ledger().pending_update("n").is_some());
}

#[tokio::test]
async fn local_update_is_stamped_and_sync_update_is_not() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(kv).await;
    m.update(&json!("s"), &d(json!({ "$set": { "v": 1 } })), Origin::RemoteSync).await.unwrap();
    assert!(m.get("s").unwrap().get(LAST_UPDATE_FIELD).is_none());
    assert!(m.ledger().pending_update("s").is_none());

    m.update(&json!("s"), &d(json!({ "$inc": { "v": 1 } })), Origin::Local).await.unwrap();
    let doc = m.get("s").unwrap();
    assert_eq!(doc["v"], json!(2));
    assert!(doc.get(LAST_UPDATE_FIELD).is_some());
}

#[tokio::test]
async fn invalid_modifier_leaves_everything_untouched() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(kv).await;
    m.insert(d(json!({ "_id": "x", "v": 1 })), Origin::RemoteSync).await.unwrap();

    let err = m
        .update(&json!("x"), &d(json!({ "$set": { "v": 2 }, "w": 3 })), Origin::Local)
        .await
        .unwrap_err();
    assert!(matches!(err, MirrorError::Query(_)));
    assert_eq!(m.get("x").unwrap()["v"], json!(1));
    assert!(m.ledger().snapshot().updated_docs.is_empty());
}

// ============================================================================
// Remove
// ============================================================================

#[tokio::test]
async fn removing_twice_queues_id_once() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(Arc::clone(&kv)).await;
    m.insert(d(json!({ "_id": "x" })), Origin::Local).await.unwrap();

    assert!(m.remove(RemoveRequest::new("x"), Origin::Local).await.unwrap());
    assert!(!m.remove(RemoveRequest::new("x"), Origin::Local).await.unwrap());

    let record = m.ledger().snapshot();
    assert_eq!(record.removed_docs, vec!["x".to_string()]);
    assert!(record.updated_docs.is_empty());
    assert!(!kv.contains("x", m.store_handle()));
}

#[tokio::test]
async fn remove_only_keeps_durable_copy() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(Arc::clone(&kv)).await;
    m.insert(d(json!({ "_id": "x" })), Origin::Local).await.unwrap();

    let removed = m
        .remove_doc(&d(json!({ "_id": "x", "removeOnly": true })), Origin::Local)
        .await
        .unwrap();
    assert!(removed);
    assert!(m.get("x").is_none());
    assert!(kv.contains("x", m.store_handle()));
    assert!(!m.ledger().is_removal_pending("x"));
    assert!(m.ledger().pending_update("x").is_some());
}

#[tokio::test]
async fn sync_remove_drops_queued_upload() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(kv).await;
    m.insert(d(json!({ "_id": "x" })), Origin::Local).await.unwrap();

    m.remove(RemoveRequest::new("x"), Origin::RemoteSync).await.unwrap();
    assert!(m.ledger().pending_update("x").is_none());
    assert!(!m.ledger().is_removal_pending("x"));
}

// ============================================================================
// Storage failures
// ============================================================================

#[tokio::test]
async fn failed_write_rolls_back_and_skips_ledger() {
    let kv = Arc::new(FlakyStore::new());
    let m = MirrorCollection::open("todos", MirrorOptions::new("app"), Arc::clone(&kv) as Arc<dyn KeyValueStore>)
        .await
        .unwrap();
    m.insert(d(json!({ "_id": "x", "v": 1 })), Origin::Local).await.unwrap();
    let before = m.ledger().snapshot();

    kv.fail_writes(true);
    let err = m
        .update(&json!("x"), &d(json!({ "$set": { "v": 2 } })), Origin::Local)
        .await
        .unwrap_err();
    assert!(matches!(err, MirrorError::Storage(StorageError::Backend { .. })));
    assert_eq!(m.get("x").unwrap()["v"], json!(1));

    assert!(m.insert(d(json!({ "_id": "y" })), Origin::Local).await.is_err());
    assert!(m.get("y").is_none());
    assert!(!m.is_tracked("y"));

    assert!(m.remove(RemoveRequest::new("x"), Origin::Local).await.is_err());
    assert!(m.get("x").is_some());
    assert!(m.is_tracked("x"));

    assert_eq!(m.ledger().snapshot(), before);
}

#[tokio::test]
async fn stored_docs_reads_durable_copies() {
    let kv = Arc::new(MemoryStore::new());
    let m = open(kv).await;
    m.insert(d(json!({ "_id": "a", "done": true })), Origin::Local).await.unwrap();
    m.insert(d(json!({ "_id": "b", "done": false })), Origin::Local).await.unwrap();
    m.remove(RemoveRequest::remove_only("a"), Origin::Local).await.unwrap();

    let done = m.stored_docs(&json!({ "done": true })).await.unwrap();
    assert_eq!(done.len(), 1);
    assert_eq!(done[0]["_id"], json!("a"));
}
