//! Sync-specific types: the transport trait and the result/error types of a
//! replay.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Document;

// ============================================================================
// SyncTransport: user-provided remote calls
// ============================================================================

/// Remote functions used by outbound replay.
///
/// Implementations own the network transport and its retry policy.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    /// Delete `doc` (only `_id` is set) upstream.
    async fn remove_doc(&self, doc: &Document) -> std::result::Result<(), SyncTransportError>;

    /// Upsert `doc` upstream. Returns the server's authoritative version.
    /// `None` means the upload was not confirmed and stays queued. A version
    /// carrying `removedServer: true` means the document was deleted
    /// upstream; a different `_id` means the server stored it under its own
    /// id.
    async fn update_doc(
        &self,
        doc: &Document,
    ) -> std::result::Result<Option<Document>, SyncTransportError>;
}

/// Transport-level error.
#[derive(Debug, Clone)]
pub struct SyncTransportError {
    pub message: String,
    pub kind: SyncErrorKind,
}

impl SyncTransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: SyncErrorKind::Transient,
        }
    }

    pub fn with_kind(message: impl Into<String>, kind: SyncErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }
}

impl std::fmt::Display for SyncTransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SyncTransportError {}

// ============================================================================
// Results
// ============================================================================

/// Classification of sync errors. Reported only: no kind drops a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncErrorKind {
    /// Worth retrying on the next replay (timeouts, dropped connection).
    Transient,
    /// The server rejected the document; retrying will not help.
    Permanent,
    /// The session is not authorized for the call.
    Auth,
    /// The server is throttling or out of quota.
    Capacity,
}

/// Where in a replay an error happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Outbound removal of a pending-removed id.
    Remove,
    /// Outbound upload of a pending-updated document.
    Update,
    /// Applying server documents locally.
    Inbound,
    /// Reading or writing the control ledger.
    Ledger,
}

/// A sync error: collected in `SyncResult.errors`, never returned as `Err`.
#[derive(Debug, Clone)]
pub struct SyncErrorEvent {
    pub phase: SyncPhase,
    pub collection: String,
    pub id: Option<String>,
    pub error: String,
    pub kind: SyncErrorKind,
}

/// Outcome of one replay.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    /// Pending removals confirmed upstream.
    pub removed: usize,
    /// Pending uploads confirmed upstream.
    pub updated: usize,
    /// Uploads the server answered without a document. They stay queued.
    pub unconfirmed: usize,
    /// Documents the server reported as deleted upstream.
    pub deleted_upstream: usize,
    /// Inbound documents upserted locally.
    pub applied: usize,
    /// Inbound documents without an id.
    pub skipped: usize,
    pub errors: Vec<SyncErrorEvent>,
}

impl SyncResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Callback type for sync error events.
pub type SyncErrorCallback = dyn Fn(&SyncErrorEvent) + Send + Sync;

/// Shared handle to a [`SyncErrorCallback`].
pub type SharedErrorCallback = Arc<SyncErrorCallback>;
