//! CollectionEvent: a mutation applied to a `MemoryCollection`.

use crate::types::Document;

/// Raised after each insert, update or remove on the in-memory collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent {
    Added { id: String, doc: Document },
    Changed { id: String, doc: Document, old: Document },
    Removed { id: String, doc: Document },
}

impl CollectionEvent {
    /// Id of the affected document.
    pub fn id(&self) -> &str {
        match self {
            Self::Added { id, .. } | Self::Changed { id, .. } | Self::Removed { id, .. } => id,
        }
    }

    /// Document as it is after the event (before removal for `Removed`).
    pub fn doc(&self) -> &Document {
        match self {
            Self::Added { doc, .. } | Self::Changed { doc, .. } | Self::Removed { doc, .. } => doc,
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Removed { .. })
    }
}
