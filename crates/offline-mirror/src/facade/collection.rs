//! OfflineCollection: the connectivity-aware entry point used by the CRUD
//! layer.
//!
//! On the client, reads are served by the local mirror. Writes go to the
//! server while connected and are queued in the mirror's ledger while the
//! connection is waiting to retry. Reconnection is handled by `subscribe`,
//! which drains the ledger before a live subscription starts.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::MirrorOptions;
use crate::error::{QueryError, Result, SyncError};
use crate::mirror::MirrorCollection;
use crate::observer::{ChangeObserver, ObserverStats};
use crate::query::FindOptions;
use crate::storage::KeyValueStore;
use crate::sync::{SyncEngine, SyncResult, SyncTransport};
use crate::types::{doc_id, ConnectionState, Document, Origin, Runtime, ID_FIELD};

use super::traits::{CanonicalCollection, Connectivity, LiveSubscription, RemoteMethods};
use super::transport::MethodTransport;

/// Methods that can be queued while offline.
const OFFLINE_METHODS: [&str; 3] = ["insert", "update", "remove"];

/// Handle returned by [`OfflineCollection::subscribe`].
pub enum SubscriptionHandle {
    /// A server subscription.
    Live(Box<dyn LiveSubscription>),
    /// Served from the rehydrated local mirror; ready once rehydration is done.
    Cached(watch::Receiver<bool>),
}

impl SubscriptionHandle {
    pub fn ready(&self) -> bool {
        match self {
            Self::Live(sub) => sub.ready(),
            Self::Cached(initialized) => *initialized.borrow(),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, Self::Cached(_))
    }

    /// Wait until a cached handle is ready. Live handles return immediately.
    pub async fn wait_ready(&mut self) -> bool {
        match self {
            Self::Live(sub) => sub.ready(),
            Self::Cached(initialized) => initialized.wait_for(|ready| *ready).await.is_ok(),
        }
    }

    pub fn stop(&self) {
        if let Self::Live(sub) = self {
            sub.stop();
        }
    }
}

struct AttachedObserver {
    observer: Arc<ChangeObserver>,
    task: JoinHandle<ObserverStats>,
}

pub struct OfflineCollection {
    name: String,
    options: MirrorOptions,
    mirror: Arc<MirrorCollection>,
    engine: SyncEngine,
    transport: MethodTransport,
    remote: Arc<dyn RemoteMethods>,
    connectivity: Arc<dyn Connectivity>,
    canonical: Option<Arc<dyn CanonicalCollection>>,
    observer: Mutex<Option<AttachedObserver>>,
}

impl OfflineCollection {
    /// Open the mirror for `name` and wire it to its collaborators.
    ///
    /// On the client the mirror is rehydrated from the durable store and, if
    /// a canonical collection is given, its changes are mirrored from then on.
    pub async fn open(
        name: impl Into<String>,
        options: MirrorOptions,
        store: Arc<dyn KeyValueStore>,
        remote: Arc<dyn RemoteMethods>,
        connectivity: Arc<dyn Connectivity>,
        canonical: Option<Arc<dyn CanonicalCollection>>,
    ) -> Result<Self> {
        let name = name.into();
        let mirror = Arc::new(MirrorCollection::open(name.clone(), options.clone(), store).await?);
        let collection = Self {
            engine: SyncEngine::new(Arc::clone(&mirror)),
            transport: MethodTransport::new(Arc::clone(&remote), name.clone()),
            name,
            options,
            mirror,
            remote,
            connectivity,
            canonical,
            observer: Mutex::new(None),
        };

        if collection.is_client() {
            if let Err(e) = collection.mirror.rehydrate(true).await {
                tracing::warn!(collection = %collection.name, error = %e, "initial rehydration failed");
            }
            collection.attach_observer();
        }
        Ok(collection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mirror(&self) -> &Arc<MirrorCollection> {
        &self.mirror
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    fn is_client(&self) -> bool {
        self.options.runtime == Runtime::Client
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Local mirror on the client, canonical collection otherwise.
    pub fn find(&self, selector: &Value, options: &FindOptions) -> Result<Vec<Document>> {
        if self.is_client() {
            return self.mirror.find(selector, options);
        }
        match &self.canonical {
            Some(canonical) => canonical.find(selector, options),
            None => Ok(Vec::new()),
        }
    }

    pub fn find_one(&self, selector: &Value, options: &FindOptions) -> Result<Option<Document>> {
        if self.is_client() {
            return self.mirror.find_one(selector, options);
        }
        match &self.canonical {
            Some(canonical) => canonical.find_one(selector, options),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Subscribe to `<collection>.<publication>`. `None` off the client.
    ///
    /// While the connection is waiting to retry, the handle is backed by a
    /// (debounced) rehydration of the local mirror. Otherwise, if a sync is
    /// due and the connection is up, the ledger is drained first so the
    /// subscription's snapshot cannot clobber unsynced local edits.
    pub async fn subscribe(&self, publication: &str, params: Vec<Value>) -> Option<SubscriptionHandle> {
        if !self.is_client() {
            return None;
        }
        let status = self.connectivity.status();

        if status.status == ConnectionState::Waiting {
            if let Err(e) = self.mirror.rehydrate(false).await {
                tracing::warn!(collection = %self.name, error = %e, "rehydration failed");
            }
            return Some(SubscriptionHandle::Cached(self.mirror.initialized()));
        }

        if status.connected && self.need_sync() {
            let result = self.engine.sync_from_client(&self.transport).await;
            if !result.is_ok() {
                tracing::warn!(
                    collection = %self.name,
                    errors = result.errors.len(),
                    "sync before subscribe finished with errors"
                );
            }
        }
        let name = format!("{}.{}", self.name, publication);
        Some(SubscriptionHandle::Live(self.remote.subscribe(&name, params)))
    }

    // -----------------------------------------------------------------------
    // Methods
    // -----------------------------------------------------------------------

    /// Call `<collection>.<name>` on the server, or queue it locally.
    ///
    /// Connected: the call goes to the server. Waiting: `insert`, `update`
    /// and `remove` are applied to the mirror and queued; other methods fail
    /// with `SyncError::NotConnected`, as does any call in other states.
    pub async fn call_method(&self, name: &str, params: Vec<Value>) -> Result<Value> {
        let status = self.connectivity.status();
        let method = format!("{}.{}", self.name, name);

        if status.connected {
            return self
                .remote
                .call(&method, params)
                .await
                .map_err(|e| SyncError::Transport(e.message).into());
        }

        if status.status == ConnectionState::Waiting && OFFLINE_METHODS.contains(&name) {
            let doc = match params.into_iter().next() {
                Some(Value::Object(doc)) => doc,
                Some(Value::String(id)) => {
                    let mut doc = Map::new();
                    doc.insert(ID_FIELD.to_string(), Value::String(id));
                    doc
                }
                _ => Document::new(),
            };
            return self.call_offline_method(name, doc).await;
        }

        tracing::info!(collection = %self.name, method = %method, "no connection to the server, call dropped");
        Err(SyncError::NotConnected { method }.into())
    }

    /// Apply `insert`, `update` or `remove` to the local mirror as a local
    /// mutation.
    ///
    /// `update` merges the partial `doc` over the current document, read from
    /// the canonical collection when connected and from the mirror otherwise,
    /// so fields absent from the partial are kept.
    pub async fn call_offline_method(&self, name: &str, doc: Document) -> Result<Value> {
        match name {
            "insert" => Ok(self
                .mirror
                .insert(doc, Origin::Local)
                .await?
                .map(Value::String)
                .unwrap_or(Value::Null)),

            "update" => {
                let Some(id) = doc_id(&doc).map(str::to_string) else {
                    return Err(QueryError::InvalidModifier("update needs an _id".to_string()).into());
                };
                let mut merged = self.current_doc(&id)?.unwrap_or_default();
                merged.extend(doc);
                let updated = self
                    .mirror
                    .update(&Value::String(id), &merged, Origin::Local)
                    .await?;
                Ok(updated.map(Value::Object).unwrap_or(Value::Null))
            }

            "remove" => Ok(Value::Bool(self.mirror.remove_doc(&doc, Origin::Local).await?)),

            other => Err(SyncError::UnsupportedOfflineMethod(other.to_string()).into()),
        }
    }

    fn current_doc(&self, id: &str) -> Result<Option<Document>> {
        let selector = Value::String(id.to_string());
        match &self.canonical {
            Some(canonical) if self.connectivity.status().connected => {
                canonical.find_one(&selector, &FindOptions::default())
            }
            _ => Ok(self.mirror.get(id)),
        }
    }

    // -----------------------------------------------------------------------
    // Observer
    // -----------------------------------------------------------------------

    /// Start mirroring the canonical collection. Returns false off the
    /// client, without a canonical collection, or when already attached.
    pub fn attach_observer(&self) -> bool {
        let Some(canonical) = self.canonical.as_ref().filter(|_| self.is_client()) else {
            return false;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(collection = %self.name, "no tokio runtime, observer not attached");
            return false;
        };
        let mut slot = self.observer.lock();
        if slot.is_some() {
            return false;
        }
        let observer = Arc::new(ChangeObserver::new(Arc::clone(&self.mirror)));
        let task = runtime.spawn(Arc::clone(&observer).run(canonical.observe()));
        *slot = Some(AttachedObserver { observer, task });
        true
    }

    /// Stop mirroring. Returns the final counters if an observer was attached.
    pub fn detach_observer(&self) -> Option<ObserverStats> {
        let attached = self.observer.lock().take()?;
        attached.task.abort();
        Some(attached.observer.stats())
    }

    pub fn observer_stats(&self) -> Option<ObserverStats> {
        self.observer.lock().as_ref().map(|a| a.observer.stats())
    }

    // -----------------------------------------------------------------------
    // Sync passthroughs
    // -----------------------------------------------------------------------

    pub fn need_sync(&self) -> bool {
        self.mirror.ledger().need_sync(Utc::now())
    }

    /// Outbound replay through the collection's `remove` / `sync` methods.
    pub async fn sync_from_client(&self) -> SyncResult {
        self.engine.sync_from_client(&self.transport).await
    }

    /// Outbound replay through caller-supplied remote functions.
    pub async fn sync_from_client_with(&self, transport: &dyn SyncTransport) -> SyncResult {
        self.engine.sync_from_client(transport).await
    }

    pub async fn sync_from_server(&self, docs: &[Document]) -> SyncResult {
        self.engine.sync_from_server(docs).await
    }

    /// Detach the observer and close the mirror.
    pub fn close(&self) {
        self.detach_observer();
        self.mirror.close();
    }
}
