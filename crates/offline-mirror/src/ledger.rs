//! Control store ledger: what still has to be reconciled with the server.
//!
//! One [`ControlRecord`] per collection, stored under the key `"config"` of
//! the collection's control store. The record is loaded lazily, cached, and
//! written back in full after every mutation. Mutations are applied to the
//! cached record under a synchronous lock; persists are serialized and a
//! persist carrying an older revision than one already written is skipped,
//! so the durable copy never moves backwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::codec::{self, tagged_date};
use crate::config::MirrorOptions;
use crate::error::{CodecError, Result};
use crate::storage::{KeyValueStore, StoreHandle};
use crate::sync::SyncErrorKind;
use crate::types::{doc_id, Document};

/// Key of the control record inside the control store.
pub const CONTROL_KEY: &str = "config";

// ============================================================================
// Record types
// ============================================================================

/// A document queued for upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpdate {
    /// Queue position. Re-queuing an id gives it a fresh, higher `seq`.
    pub seq: u64,
    pub doc: Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Update,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Success,
    Error,
}

/// One outbound replay outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    #[serde(with = "tagged_date")]
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    pub status: HistoryStatus,
    pub doc_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<SyncErrorKind>,
}

impl HistoryItem {
    pub fn success(kind: HistoryKind, doc_id: impl Into<String>) -> Self {
        Self {
            date: Utc::now(),
            kind,
            status: HistoryStatus::Success,
            doc_id: doc_id.into(),
            error: None,
            error_kind: None,
        }
    }

    pub fn failure(
        kind: HistoryKind,
        doc_id: impl Into<String>,
        error: impl Into<String>,
        error_kind: SyncErrorKind,
    ) -> Self {
        Self {
            date: Utc::now(),
            kind,
            status: HistoryStatus::Error,
            doc_id: doc_id.into(),
            error: Some(error.into()),
            error_kind: Some(error_kind),
        }
    }
}

/// Invoked after each history entry is recorded.
pub type HistoryCallback = Arc<dyn Fn(&HistoryItem) + Send + Sync>;

/// The persisted sync state of one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ControlRecord {
    /// Ids deleted locally, pending upstream deletion.
    pub removed_docs: Vec<String>,
    /// Documents mutated locally, pending upload, keyed by id.
    pub updated_docs: BTreeMap<String, PendingUpdate>,
    pub sync_history: Vec<HistoryItem>,
    #[serde(with = "tagged_date::option")]
    pub last_client_sync: Option<DateTime<Utc>>,
    next_seq: u64,
}

impl ControlRecord {
    /// Whether an outbound sync is due at `now`.
    pub fn need_sync(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        if !self.removed_docs.is_empty() || !self.updated_docs.is_empty() {
            return true;
        }
        match self.last_client_sync {
            None => true,
            Some(last) => now.signed_duration_since(last) > stale_after,
        }
    }

    /// Pending uploads in queue order.
    pub fn pending_updates(&self) -> Vec<(String, PendingUpdate)> {
        let mut pending: Vec<_> = self
            .updated_docs
            .iter()
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect();
        pending.sort_by_key(|(_, p)| p.seq);
        pending
    }

    fn push_updated(&mut self, id: &str, doc: Document) -> u64 {
        self.removed_docs.retain(|r| r != id);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.updated_docs.insert(id.to_string(), PendingUpdate { seq, doc });
        seq
    }

    fn push_removed(&mut self, id: &str) -> bool {
        self.updated_docs.remove(id);
        if self.removed_docs.iter().any(|r| r == id) {
            return false;
        }
        self.removed_docs.push(id.to_string());
        true
    }

    fn encode(&self) -> Result<String> {
        let value = serde_json::to_value(self).map_err(CodecError::Serialize)?;
        codec::serialize_value(&value)
    }

    fn decode(raw: &str) -> Result<Self> {
        let value = codec::deserialize_value(raw)?;
        serde_json::from_value(value).map_err(|e| CodecError::Parse(e).into())
    }
}

// ============================================================================
// ControlStore
// ============================================================================

#[derive(Default)]
struct LedgerState {
    record: Option<ControlRecord>,
    revision: u64,
}

/// Write-through cache of a collection's [`ControlRecord`].
pub struct ControlStore {
    store: Arc<dyn KeyValueStore>,
    handle: StoreHandle,
    stale_after: chrono::Duration,
    history_limit: usize,
    state: Mutex<LedgerState>,
    load_lock: tokio::sync::Mutex<()>,
    /// Revision of the last record written to the store.
    persisted: tokio::sync::Mutex<u64>,
    on_history: Mutex<Option<HistoryCallback>>,
}

impl ControlStore {
    pub fn new(store: Arc<dyn KeyValueStore>, collection: &str, options: &MirrorOptions) -> Self {
        Self {
            store,
            handle: StoreHandle::control(&options.namespace, collection),
            stale_after: options.stale_after(),
            history_limit: options.history_limit,
            state: Mutex::new(LedgerState::default()),
            load_lock: tokio::sync::Mutex::new(()),
            persisted: tokio::sync::Mutex::new(0),
            on_history: Mutex::new(None),
        }
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }

    /// Register the `syncnavigate` hook. Replaces any previous hook.
    pub fn set_on_history(&self, callback: impl Fn(&HistoryItem) + Send + Sync + 'static) {
        *self.on_history.lock() = Some(Arc::new(callback));
    }

    fn cached(&self) -> Option<ControlRecord> {
        self.state.lock().record.clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().record.is_some()
    }

    /// Load the record once and cache it. An absent or unreadable record is
    /// replaced with an empty one, which is written back.
    pub async fn load(&self) -> Result<ControlRecord> {
        if let Some(record) = self.cached() {
            return Ok(record);
        }
        let _guard = self.load_lock.lock().await;
        if let Some(record) = self.cached() {
            return Ok(record);
        }

        let stored = self.store.get(CONTROL_KEY, &self.handle).await?;
        let loaded = match stored.as_deref().map(ControlRecord::decode) {
            Some(Ok(record)) => Some(record),
            Some(Err(e)) => {
                tracing::warn!(store = %self.handle, error = %e, "unreadable control record, starting empty");
                None
            }
            None => None,
        };

        match loaded {
            Some(record) => {
                self.state.lock().record = Some(record.clone());
                Ok(record)
            }
            None => {
                tracing::debug!(store = %self.handle, "initializing empty control record");
                let record = ControlRecord::default();
                let revision = {
                    let mut st = self.state.lock();
                    st.record = Some(record.clone());
                    st.revision += 1;
                    st.revision
                };
                self.persist(revision, &record).await?;
                Ok(record)
            }
        }
    }

    /// Apply `f` to the cached record, then write the record through.
    async fn mutate<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut ControlRecord) -> R + Send,
        R: Send,
    {
        self.load().await?;
        let (out, revision, snapshot) = {
            let mut st = self.state.lock();
            let record = st.record.get_or_insert_with(ControlRecord::default);
            let out = f(record);
            let snapshot = record.clone();
            st.revision += 1;
            (out, st.revision, snapshot)
        };
        self.persist(revision, &snapshot).await?;
        Ok(out)
    }

    async fn persist(&self, revision: u64, record: &ControlRecord) -> Result<()> {
        let mut persisted = self.persisted.lock().await;
        if *persisted >= revision {
            return Ok(());
        }
        let raw = record.encode()?;
        self.store.set(CONTROL_KEY, &raw, &self.handle).await?;
        *persisted = revision;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Ledger edits
    // ------------------------------------------------------------------------

    /// Queue `doc` for upload, replacing any queued version of the same id.
    /// Returns the queue position, or `None` for an id-less document.
    pub async fn add_updated_doc(&self, doc: &Document) -> Result<Option<u64>> {
        let Some(id) = doc_id(doc).map(str::to_string) else {
            return Ok(None);
        };
        let doc = doc.clone();
        self.mutate(move |r| Some(r.push_updated(&id, doc))).await
    }

    pub async fn del_updated_doc(&self, id: &str) -> Result<bool> {
        self.mutate(|r| r.updated_docs.remove(id).is_some()).await
    }

    /// Drop the queued upload for `id` only if it is still the one queued at
    /// `seq`. A newer local edit keeps its entry.
    pub async fn del_updated_doc_if(&self, id: &str, seq: u64) -> Result<bool> {
        self.mutate(|r| {
            if r.updated_docs.get(id).map(|p| p.seq) == Some(seq) {
                r.updated_docs.remove(id);
                true
            } else {
                false
            }
        })
        .await
    }

    /// Queue `id` for upstream deletion. Returns false if already queued.
    pub async fn add_removed_doc(&self, id: &str) -> Result<bool> {
        self.mutate(|r| r.push_removed(id)).await
    }

    pub async fn del_removed_doc(&self, id: &str) -> Result<bool> {
        self.mutate(|r| {
            let before = r.removed_docs.len();
            r.removed_docs.retain(|x| x != id);
            r.removed_docs.len() != before
        })
        .await
    }

    /// Append a history entry, trim to the configured limit, and notify the
    /// hook. Hook panics are swallowed.
    pub async fn record_history(&self, item: HistoryItem) -> Result<()> {
        let limit = self.history_limit;
        let entry = item.clone();
        self.mutate(move |r| {
            r.sync_history.push(entry);
            if r.sync_history.len() > limit {
                let excess = r.sync_history.len() - limit;
                r.sync_history.drain(..excess);
            }
        })
        .await?;

        let hook = self.on_history.lock().clone();
        if let Some(hook) = hook {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(&item)));
        }
        Ok(())
    }

    pub async fn mark_synced(&self, now: DateTime<Utc>) -> Result<()> {
        self.mutate(|r| r.last_client_sync = Some(now)).await
    }

    // ------------------------------------------------------------------------
    // Reads (cached record only)
    // ------------------------------------------------------------------------

    /// Whether an outbound sync is due. True until the record is loaded.
    pub fn need_sync(&self, now: DateTime<Utc>) -> bool {
        match &self.state.lock().record {
            Some(record) => record.need_sync(now, self.stale_after),
            None => true,
        }
    }

    /// Copy of the cached record (empty if not loaded yet).
    pub fn snapshot(&self) -> ControlRecord {
        self.state.lock().record.clone().unwrap_or_default()
    }

    pub fn pending_update(&self, id: &str) -> Option<PendingUpdate> {
        self.state
            .lock()
            .record
            .as_ref()
            .and_then(|r| r.updated_docs.get(id).cloned())
    }

    pub fn is_removal_pending(&self, id: &str) -> bool {
        self.state
            .lock()
            .record
            .as_ref()
            .is_some_and(|r| r.removed_docs.iter().any(|x| x == id))
    }

    pub fn last_client_sync(&self) -> Option<DateTime<Utc>> {
        self.state.lock().record.as_ref().and_then(|r| r.last_client_sync)
    }

    /// Raw JSON of the cached record, for diagnostics.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.snapshot()).unwrap_or(Value::Null)
    }
}
