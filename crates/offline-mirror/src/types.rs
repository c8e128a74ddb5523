use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A JSON-like document. Every stored document carries a string `_id`.
pub type Document = Map<String, Value>;

/// Unique identifier field.
pub const ID_FIELD: &str = "_id";
/// Stamped on every local (non-sync) mutation.
pub const LAST_UPDATE_FIELD: &str = "lastupdate";
/// Remove only the in-memory copy (used when mirroring a server-side delete).
pub const REMOVE_ONLY_FIELD: &str = "removeOnly";
/// Server marks a document as deleted upstream.
pub const REMOVED_SERVER_FIELD: &str = "removedServer";
/// Server marker on upload responses; never kept locally.
pub const UPDATED_SERVER_FIELD: &str = "updatedServer";

/// Read the `_id` of a document, if it is a non-empty string.
pub fn doc_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Read a boolean flag, treating anything but `true` as unset.
pub fn flag(doc: &Document, field: &str) -> bool {
    doc.get(field).and_then(Value::as_bool).unwrap_or(false)
}

// ============================================================================
// Origin
// ============================================================================

/// Where a mutation came from.
///
/// `Local` mutations are stamped and queued in the control ledger.
/// `RemoteSync` mutations mirror server state and never re-enter the ledger,
/// otherwise an inbound replay would be queued for upload again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Origin {
    #[default]
    Local,
    RemoteSync,
}

impl Origin {
    pub fn is_local(self) -> bool {
        matches!(self, Origin::Local)
    }
}

// ============================================================================
// RemoveRequest
// ============================================================================

/// Target of a mirror `remove`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveRequest {
    pub id: String,
    /// Drop the in-memory copy only; leave the durable copy and ledger alone.
    pub remove_only: bool,
}

impl RemoveRequest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remove_only: false,
        }
    }

    pub fn remove_only(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            remove_only: true,
        }
    }

    /// Build a request from a document. Returns `None` for an empty or
    /// id-less document.
    pub fn from_doc(doc: &Document) -> Option<Self> {
        if doc.is_empty() {
            return None;
        }
        let id = doc_id(doc)?;
        Some(Self {
            id: id.to_string(),
            remove_only: flag(doc, REMOVE_ONLY_FIELD),
        })
    }
}

// ============================================================================
// Connectivity
// ============================================================================

/// Connection state reported by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Connecting,
    Failed,
    /// Disconnected and waiting to retry. Local queueing only happens here.
    Waiting,
    Offline,
}

/// Snapshot of the connection, as polled by the facade and sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub status: ConnectionState,
}

impl ConnectionStatus {
    pub fn connected() -> Self {
        Self {
            connected: true,
            status: ConnectionState::Connected,
        }
    }

    pub fn waiting() -> Self {
        Self {
            connected: false,
            status: ConnectionState::Waiting,
        }
    }

    pub fn with_state(status: ConnectionState) -> Self {
        Self {
            connected: status == ConnectionState::Connected,
            status,
        }
    }
}

// ============================================================================
// Runtime
// ============================================================================

/// Which side of the wire this process runs on. Reads are served from the
/// local mirror only on the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    #[default]
    Client,
    Server,
}
