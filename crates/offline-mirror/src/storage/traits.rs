//! Durable key-value storage consumed by the mirror.
//!
//! A backend holds any number of named stores. Each mirrored collection uses
//! two of them: one for serialized documents keyed by `_id`, and one control
//! store holding the sync ledger under a single key.

use async_trait::async_trait;

use crate::error::Result;

/// Address of one named store inside a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreHandle {
    pub database: String,
    pub store: String,
}

/// Build a handle for `store` inside `database`.
pub fn create_store(database: impl Into<String>, store: impl Into<String>) -> StoreHandle {
    StoreHandle {
        database: database.into(),
        store: store.into(),
    }
}

impl StoreHandle {
    /// Document store of a collection: `<namespace>_<collection>` / `<collection>-store`.
    pub fn documents(namespace: &str, collection: &str) -> Self {
        create_store(
            format!("{namespace}_{collection}"),
            format!("{collection}-store"),
        )
    }

    /// Control store of a collection: `<namespace>_<collection>_Control` / `<collection>-control`.
    pub fn control(namespace: &str, collection: &str) -> Self {
        create_store(
            format!("{namespace}_{collection}_Control"),
            format!("{collection}-control"),
        )
    }
}

impl std::fmt::Display for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.database, self.store)
    }
}

/// Asynchronous string key-value store.
///
/// Implementations must serialize writes per key: a `set` that returned
/// before another `set` on the same key started must not win over it.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `None` when the key is absent.
    async fn get(&self, key: &str, store: &StoreHandle) -> Result<Option<String>>;

    /// Insert or replace a value.
    async fn set(&self, key: &str, value: &str, store: &StoreHandle) -> Result<()>;

    /// Delete a key. Deleting an absent key is not an error.
    async fn del(&self, key: &str, store: &StoreHandle) -> Result<()>;

    /// Every key of the store, in insertion order where the backend keeps one.
    async fn keys(&self, store: &StoreHandle) -> Result<Vec<String>>;
}
