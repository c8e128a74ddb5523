//! MirrorCollection: the in-memory collection with write-through persistence.
//!
//! Every mutation goes through three steps: apply it to the in-memory
//! collection, persist the resulting document to the durable store, and (for
//! [`Origin::Local`] mutations only) record it in the control ledger. The
//! durable write is awaited before the operation returns. If it fails, the
//! in-memory change is rolled back and the ledger is left untouched.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::codec;
use crate::config::MirrorOptions;
use crate::error::{MirrorError, QueryError, Result, StorageError};
use crate::ledger::ControlStore;
use crate::query::{deep_merge, is_operator_modifier, matches_selector, upsert_seed, FindOptions};
use crate::reactive::{CollectionEvent, ListenerId};
use crate::storage::{KeyValueStore, StoreHandle};
use crate::types::{doc_id, Document, Origin, RemoveRequest, ID_FIELD, LAST_UPDATE_FIELD};

use super::keys::TrackedKeys;
use super::memory::{new_id, MemoryCollection, UpdateOptions, Updated};

/// Add a `lastupdate` stamp to a modifier.
fn stamp_modifier(modifier: &Document) -> Result<Document> {
    let mut stamped = modifier.clone();
    if is_operator_modifier(modifier)? {
        let set = stamped
            .entry("$set".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(set) = set else {
            return Err(QueryError::InvalidModifier("$set expects an object".to_string()).into());
        };
        set.insert(LAST_UPDATE_FIELD.to_string(), codec::now_value());
    } else {
        stamped.insert(LAST_UPDATE_FIELD.to_string(), codec::now_value());
    }
    Ok(stamped)
}

/// One mirrored collection.
pub struct MirrorCollection {
    name: String,
    options: MirrorOptions,
    store: Arc<dyn KeyValueStore>,
    handle: StoreHandle,
    local: MemoryCollection,
    keys: Mutex<TrackedKeys>,
    ledger: ControlStore,
    initialized: watch::Sender<bool>,
    last_rehydrate: Mutex<Option<DateTime<Utc>>>,
    rehydrate_lock: tokio::sync::Mutex<()>,
    closed: AtomicBool,
}

impl MirrorCollection {
    /// Create the collection without touching the durable store.
    pub fn new(name: impl Into<String>, options: MirrorOptions, store: Arc<dyn KeyValueStore>) -> Self {
        let name = name.into();
        let (initialized, _) = watch::channel(false);
        Self {
            handle: StoreHandle::documents(&options.namespace, &name),
            ledger: ControlStore::new(Arc::clone(&store), &name, &options),
            local: MemoryCollection::new(),
            keys: Mutex::new(TrackedKeys::new()),
            initialized,
            last_rehydrate: Mutex::new(None),
            rehydrate_lock: tokio::sync::Mutex::new(()),
            closed: AtomicBool::new(false),
            name,
            options,
            store,
        }
    }

    /// Create the collection, load its control record and enumerate its
    /// durable keys.
    pub async fn open(name: impl Into<String>, options: MirrorOptions, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let collection = Self::new(name, options, store);
        collection.ledger.load().await?;
        collection.refresh_keys().await?;
        Ok(collection)
    }

    /// Tear down: drop the in-memory documents and refuse further mutations.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.local.remove_all();
            self.keys.lock().drain();
            self.initialized.send_replace(false);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StorageError::Closed(self.name.clone()).into());
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    pub fn store_handle(&self) -> &StoreHandle {
        &self.handle
    }

    pub fn ledger(&self) -> &ControlStore {
        &self.ledger
    }

    pub fn local(&self) -> &MemoryCollection {
        &self.local
    }

    async fn persist(&self, id: &str, doc: &Document) -> Result<()> {
        let raw = codec::serialize(doc)?;
        self.store.set(id, &raw, &self.handle).await
    }

    // ------------------------------------------------------------------------
    // Intercepted mutations
    // ------------------------------------------------------------------------

    /// Insert a document. Empty documents are ignored (`Ok(None)`).
    pub async fn insert(&self, mut doc: Document, origin: Origin) -> Result<Option<String>> {
        if doc.is_empty() {
            return Ok(None);
        }
        self.ensure_open()?;

        let id = match doc_id(&doc) {
            Some(id) => id.to_string(),
            None => {
                let id = new_id();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };
        if origin.is_local() {
            doc.insert(LAST_UPDATE_FIELD.to_string(), codec::now_value());
        }

        self.local.insert(doc.clone())?;
        let newly_tracked = self.keys.lock().insert(&id);
        if let Err(e) = self.persist(&id, &doc).await {
            self.local.remove_id(&id);
            if newly_tracked {
                self.keys.lock().remove(&id);
            }
            return Err(e);
        }

        if origin.is_local() {
            self.ledger.add_updated_doc(&doc).await?;
        }
        Ok(Some(id))
    }

    /// Upsert the first document matching `selector`. Empty modifiers are
    /// ignored (`Ok(None)`).
    ///
    /// Returns the stored document merged over the selector's equality
    /// fields.
    pub async fn update(&self, selector: &Value, modifier: &Document, origin: Origin) -> Result<Option<Document>> {
        if modifier.is_empty() {
            return Ok(None);
        }
        self.ensure_open()?;

        let modifier = if origin.is_local() {
            stamp_modifier(modifier)?
        } else {
            modifier.clone()
        };
        let touched = self.local.update(selector, &modifier, UpdateOptions::upsert())?;
        let Some(Updated { id, previous }) = touched.into_iter().next() else {
            return Ok(None);
        };
        let Some(doc) = self.local.get(&id) else {
            return Ok(None);
        };

        let newly_tracked = self.keys.lock().insert(&id);
        if let Err(e) = self.persist(&id, &doc).await {
            match previous {
                Some(prev) => {
                    let _ = self.local.put(prev);
                }
                None => {
                    self.local.remove_id(&id);
                }
            }
            if newly_tracked {
                self.keys.lock().remove(&id);
            }
            return Err(e);
        }

        if origin.is_local() {
            self.ledger.add_updated_doc(&doc).await?;
        }
        Ok(Some(deep_merge(&upsert_seed(selector), &doc)))
    }

    /// Remove a document by id.
    ///
    /// With `remove_only` set only the in-memory copy goes; the durable copy
    /// and the ledger are untouched. Otherwise the durable copy is deleted,
    /// any queued upload for the id is dropped, and a local removal is queued
    /// for upstream deletion. Returns whether an in-memory document existed.
    pub async fn remove(&self, target: RemoveRequest, origin: Origin) -> Result<bool> {
        self.ensure_open()?;
        let removed = self.local.remove_id(&target.id);
        if target.remove_only {
            return Ok(removed.is_some());
        }

        let was_tracked = self.keys.lock().remove(&target.id);
        if let Err(e) = self.store.del(&target.id, &self.handle).await {
            if let Some(doc) = removed {
                let _ = self.local.put(doc);
            }
            if was_tracked {
                self.keys.lock().insert(&target.id);
            }
            return Err(e);
        }

        if origin.is_local() {
            self.ledger.add_removed_doc(&target.id).await?;
        } else {
            self.ledger.del_updated_doc(&target.id).await?;
        }
        Ok(removed.is_some())
    }

    /// [`remove`](Self::remove) driven by a document carrying `_id` and an
    /// optional `removeOnly` flag. Empty or id-less documents are ignored.
    pub async fn remove_doc(&self, doc: &Document, origin: Origin) -> Result<bool> {
        match RemoveRequest::from_doc(doc) {
            Some(target) => self.remove(target, origin).await,
            None => Ok(false),
        }
    }

    /// Purge every tracked id from the durable store and empty the in-memory
    /// collection. The ledger is kept.
    pub async fn clear(&self) -> Result<usize> {
        self.ensure_open()?;
        let ids = self.keys.lock().drain();
        for (i, id) in ids.iter().enumerate() {
            if let Err(e) = self.store.del(id, &self.handle).await {
                self.keys.lock().replace_all(ids[i..].iter().cloned());
                return Err(e);
            }
        }
        self.local.remove_all();
        Ok(ids.len())
    }

    // ------------------------------------------------------------------------
    // Durable store reads
    // ------------------------------------------------------------------------

    /// Re-enumerate the tracked keys from the durable store.
    pub async fn refresh_keys(&self) -> Result<Vec<String>> {
        let ids = self.store.keys(&self.handle).await?;
        self.keys.lock().replace_all(ids.iter().cloned());
        Ok(ids)
    }

    pub fn tracked_keys(&self) -> Vec<String> {
        self.keys.lock().as_slice().to_vec()
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.keys.lock().contains(id)
    }

    async fn read_stored(&self, id: &str) -> Result<Option<Document>> {
        let Some(raw) = self.store.get(id, &self.handle).await? else {
            return Ok(None);
        };
        let mut doc = codec::deserialize(&raw).map_err(|e| StorageError::Corruption {
            database: self.handle.database.clone(),
            store: self.handle.store.clone(),
            key: id.to_string(),
            source: Box::new(e),
        })?;
        if doc_id(&doc).is_none() {
            doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        }
        Ok(Some(doc))
    }

    /// Documents read straight from the durable store that match `filter`.
    pub async fn stored_docs(&self, filter: &Value) -> Result<Vec<Document>> {
        self.ensure_open()?;
        let mut out = Vec::new();
        for id in self.tracked_keys() {
            if let Some(doc) = self.read_stored(&id).await? {
                if matches_selector(&Value::Object(doc.clone()), filter)? {
                    out.push(doc);
                }
            }
        }
        Ok(out)
    }

    // ------------------------------------------------------------------------
    // Rehydration
    // ------------------------------------------------------------------------

    /// Rebuild the in-memory collection from the durable store.
    ///
    /// Skipped (`Ok(false)`) when the previous successful rebuild is younger
    /// than the debounce window, unless `force` is set. While a rebuild runs
    /// the initialized flag is false; it turns true only once the rebuild
    /// succeeds. Unreadable entries are skipped.
    pub async fn rehydrate(&self, force: bool) -> Result<bool> {
        self.ensure_open()?;
        let _guard = self.rehydrate_lock.lock().await;

        let now = Utc::now();
        if !force {
            let last = *self.last_rehydrate.lock();
            if let Some(last) = last {
                if now.signed_duration_since(last) < self.options.rehydrate_debounce() {
                    return Ok(false);
                }
            }
        }

        self.initialized.send_replace(false);
        if let Err(e) = self.rebuild().await {
            tracing::warn!(collection = %self.name, error = %e, "rehydration failed");
            return Err(e);
        }
        *self.last_rehydrate.lock() = Some(now);
        self.initialized.send_replace(true);
        Ok(true)
    }

    async fn rebuild(&self) -> Result<()> {
        let ids = self.refresh_keys().await?;
        self.local.remove_all();
        for id in ids {
            match self.read_stored(&id).await {
                Ok(Some(doc)) => {
                    self.local.put(doc)?;
                }
                Ok(None) => {}
                Err(MirrorError::Storage(StorageError::Corruption { key, source, .. })) => {
                    tracing::warn!(collection = %self.name, id = %key, error = %source, "skipping unreadable document");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Receiver for the initialized flag.
    pub fn initialized(&self) -> watch::Receiver<bool> {
        self.initialized.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.borrow()
    }

    // ------------------------------------------------------------------------
    // In-memory reads
    // ------------------------------------------------------------------------

    pub fn find(&self, selector: &Value, options: &FindOptions) -> Result<Vec<Document>> {
        self.local.find(selector, options)
    }

    pub fn find_one(&self, selector: &Value, options: &FindOptions) -> Result<Option<Document>> {
        self.local.find_one(selector, options)
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.local.get(id)
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    pub fn on_change(&self, callback: impl Fn(&CollectionEvent) + Send + Sync + 'static) -> ListenerId {
        self.local.on_change(callback)
    }
}
