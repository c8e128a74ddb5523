//! ChangeObserver: mirrors the canonical collection into the local mirror.
//!
//! Every event is applied as a sync-originated mutation, so nothing the
//! server sends is queued for upload again.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::mirror::MirrorCollection;
use crate::query::deep_merge;
use crate::types::{doc_id, Document, Origin, RemoveRequest};

/// A notification from the canonical collection's `observe`.
#[derive(Debug, Clone, PartialEq)]
pub enum ObserveEvent {
    Added(Document),
    Changed { new: Document, old: Document },
    Removed(Document),
}

/// Running event counters, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverStats {
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

pub struct ChangeObserver {
    mirror: Arc<MirrorCollection>,
    stats: Mutex<ObserverStats>,
}

impl ChangeObserver {
    pub fn new(mirror: Arc<MirrorCollection>) -> Self {
        Self {
            mirror,
            stats: Mutex::new(ObserverStats::default()),
        }
    }

    pub fn stats(&self) -> ObserverStats {
        *self.stats.lock()
    }

    async fn upsert(&self, id: &str, doc: Document) -> Result<()> {
        let mut modifier = Map::new();
        modifier.insert("$set".to_string(), Value::Object(doc));
        self.mirror
            .update(&Value::String(id.to_string()), &modifier, Origin::RemoteSync)
            .await?;
        Ok(())
    }

    /// Apply one event. Id-less documents are ignored.
    pub async fn handle(&self, event: ObserveEvent) -> Result<()> {
        match event {
            ObserveEvent::Added(doc) => {
                self.stats.lock().added += 1;
                let Some(id) = doc_id(&doc).map(str::to_string) else {
                    return Ok(());
                };
                self.upsert(&id, doc).await?;
            }
            ObserveEvent::Changed { new, old } => {
                self.stats.lock().changed += 1;
                let merged = deep_merge(&old, &new);
                let Some(id) = doc_id(&merged).map(str::to_string) else {
                    return Ok(());
                };
                self.upsert(&id, merged).await?;
            }
            ObserveEvent::Removed(doc) => {
                self.stats.lock().removed += 1;
                let Some(id) = doc_id(&doc) else {
                    return Ok(());
                };
                self.mirror
                    .remove(RemoveRequest::remove_only(id), Origin::RemoteSync)
                    .await?;
            }
        }
        Ok(())
    }

    /// Drain `events` until the sender side closes. Failed events are logged
    /// and skipped.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<ObserveEvent>) -> ObserverStats {
        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle(event).await {
                tracing::warn!(collection = %self.mirror.name(), error = %e, "failed to mirror server change");
            }
        }
        self.stats()
    }
}
