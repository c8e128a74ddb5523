//! SyncEngine: outbound and inbound replay for one mirrored collection.
//!
//! Public methods never return `Err`: failures are collected in
//! `SyncResult.errors` and recorded in the sync history. Replays on the same
//! engine are serialized; a second call waits for the first instead of
//! aborting it.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::Mutex as TokioMutex;

use crate::error::MirrorError;
use crate::ledger::{HistoryItem, HistoryKind};
use crate::mirror::MirrorCollection;
use crate::types::{
    doc_id, flag, Document, Origin, RemoveRequest, ID_FIELD, REMOVED_SERVER_FIELD,
    UPDATED_SERVER_FIELD,
};

use super::types::*;

// ============================================================================
// SyncEngine
// ============================================================================

pub struct SyncEngine {
    mirror: Arc<MirrorCollection>,
    on_error: Option<SharedErrorCallback>,
    lock: TokioMutex<()>,
}

fn id_only(id: &str) -> Document {
    let mut doc = Map::new();
    doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    doc
}

fn set_modifier(doc: Document) -> Document {
    let mut modifier = Map::new();
    modifier.insert("$set".to_string(), Value::Object(doc));
    modifier
}

impl SyncEngine {
    pub fn new(mirror: Arc<MirrorCollection>) -> Self {
        Self {
            mirror,
            on_error: None,
            lock: TokioMutex::new(()),
        }
    }

    /// Called for each error, in addition to it being collected.
    pub fn with_on_error(mut self, callback: impl Fn(&SyncErrorEvent) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn mirror(&self) -> &Arc<MirrorCollection> {
        &self.mirror
    }

    /// Whether an outbound replay is due now.
    pub fn need_sync(&self) -> bool {
        self.mirror.ledger().need_sync(Utc::now())
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    /// Drain the ledger against the server: pending removals first, then
    /// pending uploads in queue order. Always finishes by stamping
    /// `lastClientSync`, whatever the per-document outcomes.
    pub async fn sync_from_client(&self, transport: &dyn SyncTransport) -> SyncResult {
        let _guard = self.lock.lock().await;
        let mut result = SyncResult::default();

        let record = match self.mirror.ledger().load().await {
            Ok(record) => record,
            Err(e) => {
                self.report(&mut result, SyncPhase::Ledger, None, &e);
                return result;
            }
        };

        for id in &record.removed_docs {
            self.replay_removal(transport, id, &mut result).await;
        }
        for (id, _) in record.pending_updates() {
            self.replay_update(transport, &id, &mut result).await;
        }

        if let Err(e) = self.mirror.ledger().mark_synced(Utc::now()).await {
            self.report(&mut result, SyncPhase::Ledger, None, &e);
        }
        result
    }

    async fn replay_removal(&self, transport: &dyn SyncTransport, id: &str, result: &mut SyncResult) {
        let ledger = self.mirror.ledger();
        if !ledger.is_removal_pending(id) {
            return;
        }
        match transport.remove_doc(&id_only(id)).await {
            Ok(()) => {
                if let Err(e) = ledger.del_removed_doc(id).await {
                    self.report(result, SyncPhase::Ledger, Some(id), &e);
                    return;
                }
                result.removed += 1;
                self.history(result, HistoryItem::success(HistoryKind::Remove, id))
                    .await;
            }
            Err(e) => {
                tracing::warn!(collection = %self.mirror.name(), id, error = %e, "remote remove failed");
                self.transport_failure(result, SyncPhase::Remove, HistoryKind::Remove, id, &e)
                    .await;
            }
        }
    }

    async fn replay_update(&self, transport: &dyn SyncTransport, id: &str, result: &mut SyncResult) {
        let ledger = self.mirror.ledger();
        // Send what is queued now; a concurrent edit may have replaced it.
        let Some(sent) = ledger.pending_update(id) else {
            return;
        };

        let response = match transport.update_doc(&sent.doc).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(collection = %self.mirror.name(), id, error = %e, "remote update failed");
                self.transport_failure(result, SyncPhase::Update, HistoryKind::Update, id, &e)
                    .await;
                return;
            }
        };

        let Some(mut server_doc) = response else {
            // Not confirmed: the entry stays queued for the next replay.
            result.unconfirmed += 1;
            tracing::debug!(collection = %self.mirror.name(), id, "upload not confirmed");
            return;
        };

        // A local edit queued during the upload keeps its entry and is not
        // overwritten by the response.
        if ledger.pending_update(id).map(|p| p.seq) != Some(sent.seq) {
            return;
        }

        server_doc.remove(UPDATED_SERVER_FIELD);
        let server_id = doc_id(&server_doc).unwrap_or(id).to_string();
        if flag(&server_doc, REMOVED_SERVER_FIELD) {
            match self
                .mirror
                .remove(RemoveRequest::new(id), Origin::RemoteSync)
                .await
            {
                // Removing with a sync origin also drops the ledger entry.
                Ok(_) => {
                    result.deleted_upstream += 1;
                    self.history(result, HistoryItem::success(HistoryKind::Update, id))
                        .await;
                }
                Err(e) => self.report(result, SyncPhase::Update, Some(id), &e),
            }
            return;
        }

        server_doc.remove(REMOVED_SERVER_FIELD);
        let applied = self
            .mirror
            .update(&Value::String(server_id.clone()), &set_modifier(server_doc), Origin::RemoteSync)
            .await;
        if let Err(e) = applied {
            self.report(result, SyncPhase::Update, Some(id), &e);
            return;
        }

        // Only a cleared entry counts as confirmed; a newer edit stays queued.
        match ledger.del_updated_doc_if(id, sent.seq).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                self.report(result, SyncPhase::Ledger, Some(id), &e);
                return;
            }
        }

        // The server stored the upload under its own id; the local copy is
        // superseded.
        if server_id != id {
            if let Err(e) = self
                .mirror
                .remove(RemoveRequest::new(id), Origin::RemoteSync)
                .await
            {
                self.report(result, SyncPhase::Update, Some(id), &e);
            }
        }

        result.updated += 1;
        self.history(result, HistoryItem::success(HistoryKind::Update, id))
            .await;
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Apply a batch of server documents locally as sync-originated
    /// mutations. Documents flagged `removedServer` are removed, the rest are
    /// upserted. Id-less documents are skipped.
    pub async fn sync_from_server(&self, docs: &[Document]) -> SyncResult {
        let _guard = self.lock.lock().await;
        let mut result = SyncResult::default();

        for doc in docs {
            let Some(id) = doc_id(doc).map(str::to_string) else {
                result.skipped += 1;
                continue;
            };
            if flag(doc, REMOVED_SERVER_FIELD) {
                match self.mirror.remove(RemoveRequest::new(&id), Origin::RemoteSync).await {
                    Ok(_) => result.deleted_upstream += 1,
                    Err(e) => self.report(&mut result, SyncPhase::Inbound, Some(&id), &e),
                }
                continue;
            }

            let mut incoming = doc.clone();
            incoming.remove(UPDATED_SERVER_FIELD);
            incoming.remove(REMOVED_SERVER_FIELD);
            match self
                .mirror
                .update(&Value::String(id.clone()), &set_modifier(incoming), Origin::RemoteSync)
                .await
            {
                Ok(_) => result.applied += 1,
                Err(e) => self.report(&mut result, SyncPhase::Inbound, Some(&id), &e),
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Error reporting
    // -----------------------------------------------------------------------

    async fn transport_failure(
        &self,
        result: &mut SyncResult,
        phase: SyncPhase,
        kind: HistoryKind,
        id: &str,
        error: &SyncTransportError,
    ) {
        self.push_error(result, phase, Some(id), error.message.clone(), error.kind);
        let item = HistoryItem::failure(kind, id, error.message.clone(), error.kind);
        self.history(result, item).await;
    }

    async fn history(&self, result: &mut SyncResult, item: HistoryItem) {
        let id = item.doc_id.clone();
        if let Err(e) = self.mirror.ledger().record_history(item).await {
            self.report(result, SyncPhase::Ledger, Some(&id), &e);
        }
    }

    fn report(&self, result: &mut SyncResult, phase: SyncPhase, id: Option<&str>, error: &MirrorError) {
        let kind = match error {
            MirrorError::Query(_) | MirrorError::Codec(_) => SyncErrorKind::Permanent,
            _ => SyncErrorKind::Transient,
        };
        self.push_error(result, phase, id, error.to_string(), kind);
    }

    fn push_error(
        &self,
        result: &mut SyncResult,
        phase: SyncPhase,
        id: Option<&str>,
        error: String,
        kind: SyncErrorKind,
    ) {
        let event = SyncErrorEvent {
            phase,
            collection: self.mirror.name().to_string(),
            id: id.map(str::to_string),
            error,
            kind,
        };
        if let Some(ref on_error) = self.on_error {
            // Swallow callback panics so they cannot break a replay.
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                on_error(&event);
            }));
        }
        result.errors.push(event);
    }
}
