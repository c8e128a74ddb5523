//! Collaborators the facade consumes: connectivity, remote methods and the
//! canonical server-backed collection.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use crate::error::Result;
use crate::observer::ObserveEvent;
use crate::query::FindOptions;
use crate::sync::SyncTransportError;
use crate::types::{ConnectionStatus, Document};

/// Connection status probe.
pub trait Connectivity: Send + Sync {
    fn status(&self) -> ConnectionStatus;
}

/// A live server subscription.
pub trait LiveSubscription: Send + Sync {
    fn ready(&self) -> bool;
    fn stop(&self);
}

/// Remote procedure calls and publications.
#[async_trait]
pub trait RemoteMethods: Send + Sync {
    /// Call `method` (already prefixed with the collection name).
    async fn call(&self, method: &str, params: Vec<Value>) -> std::result::Result<Value, SyncTransportError>;

    /// Subscribe to `publication` (already prefixed with the collection name).
    fn subscribe(&self, publication: &str, params: Vec<Value>) -> Box<dyn LiveSubscription>;
}

/// The canonical, server-backed reactive collection.
pub trait CanonicalCollection: Send + Sync {
    fn find(&self, selector: &Value, options: &FindOptions) -> Result<Vec<Document>>;

    fn find_one(&self, selector: &Value, options: &FindOptions) -> Result<Option<Document>>;

    /// Start observing every document. Events stop when the receiver is dropped.
    fn observe(&self) -> mpsc::Receiver<ObserveEvent>;
}

// ============================================================================
// ConnectivityProbe
// ============================================================================

/// Settable [`Connectivity`], cloneable and watchable.
#[derive(Clone)]
pub struct ConnectivityProbe {
    tx: Arc<watch::Sender<ConnectionStatus>>,
}

impl ConnectivityProbe {
    pub fn new(initial: ConnectionStatus) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self, status: ConnectionStatus) {
        self.tx.send_replace(status);
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }
}

impl Connectivity for ConnectivityProbe {
    fn status(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }
}
