use thiserror::Error;

// ---------------------------------------------------------------------------
// StorageError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage backend failure on {database}/{store}: {message}")]
    Backend {
        database: String,
        store: String,
        message: String,
    },

    #[error("Storage corruption in {database}/{store} at key \"{key}\"")]
    Corruption {
        database: String,
        store: String,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Collection \"{0}\" has been closed.")]
    Closed(String),

    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    pub fn backend(
        database: impl Into<String>,
        store: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Backend {
            database: database.into(),
            store: store.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// CodecError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to parse stored document: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Failed to serialize document: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Stored payload is not a document (found {0})")]
    NotADocument(&'static str),

    #[error("Date outside years 0000-9999 cannot be stored: {0} ms")]
    DateOutOfRange(i64),
}

// ---------------------------------------------------------------------------
// QueryError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Invalid regex: {0}")]
    InvalidRegex(String),

    #[error("Invalid modifier: {0}")]
    InvalidModifier(String),

    #[error("Duplicate _id \"{0}\"")]
    DuplicateId(String),
}

// ---------------------------------------------------------------------------
// SyncError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No connection to the server; \"{method}\" was not sent")]
    NotConnected { method: String },

    #[error("Method \"{0}\" cannot be queued offline")]
    UnsupportedOfflineMethod(String),
}

// ---------------------------------------------------------------------------
// MirrorError: top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias: the default error type is `MirrorError`.
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
