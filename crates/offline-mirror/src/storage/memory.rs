//! MemoryStore: a process-local `KeyValueStore`.
//!
//! Holds every store in a `HashMap` behind a `parking_lot::Mutex`. The lock
//! is never held across an await point, so every operation completes in one
//! step and writes to a key are applied in call order.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;

use super::traits::{KeyValueStore, StoreHandle};

#[derive(Default)]
struct StoreData {
    /// Keys in first-insertion order.
    order: Vec<String>,
    values: HashMap<String, String>,
}

/// In-memory backend. Cheap to create; contents vanish with the value.
#[derive(Default)]
pub struct MemoryStore {
    stores: Mutex<HashMap<StoreHandle, StoreData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held in `store`.
    pub fn len(&self, store: &StoreHandle) -> usize {
        self.stores
            .lock()
            .get(store)
            .map(|s| s.values.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, store: &StoreHandle) -> bool {
        self.len(store) == 0
    }

    pub fn contains(&self, key: &str, store: &StoreHandle) -> bool {
        self.stores
            .lock()
            .get(store)
            .map(|s| s.values.contains_key(key))
            .unwrap_or(false)
    }

    /// Read a value without going through the async trait.
    pub fn peek(&self, key: &str, store: &StoreHandle) -> Option<String> {
        self.stores
            .lock()
            .get(store)
            .and_then(|s| s.values.get(key).cloned())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str, store: &StoreHandle) -> Result<Option<String>> {
        Ok(self.peek(key, store))
    }

    async fn set(&self, key: &str, value: &str, store: &StoreHandle) -> Result<()> {
        let mut stores = self.stores.lock();
        let data = stores.entry(store.clone()).or_default();
        if data
            .values
            .insert(key.to_string(), value.to_string())
            .is_none()
        {
            data.order.push(key.to_string());
        }
        Ok(())
    }

    async fn del(&self, key: &str, store: &StoreHandle) -> Result<()> {
        let mut stores = self.stores.lock();
        if let Some(data) = stores.get_mut(store) {
            if data.values.remove(key).is_some() {
                data.order.retain(|k| k != key);
            }
        }
        Ok(())
    }

    async fn keys(&self, store: &StoreHandle) -> Result<Vec<String>> {
        Ok(self
            .stores
            .lock()
            .get(store)
            .map(|s| s.order.clone())
            .unwrap_or_default())
    }
}
