//! Ordered set of ids known to be present in the durable store.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct TrackedKeys {
    order: Vec<String>,
    index: HashSet<String>,
}

impl TrackedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `id`. Returns true if it was not tracked before.
    pub fn insert(&mut self, id: &str) -> bool {
        if !self.index.insert(id.to_string()) {
            return false;
        }
        self.order.push(id.to_string());
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        if !self.index.remove(id) {
            return false;
        }
        self.order.retain(|k| k != id);
        true
    }

    /// Replace the whole set, keeping the first occurrence of duplicates.
    pub fn replace_all(&mut self, ids: impl IntoIterator<Item = String>) {
        self.order.clear();
        self.index.clear();
        for id in ids {
            self.insert(&id);
        }
    }

    /// Remove and return every id, in order.
    pub fn drain(&mut self) -> Vec<String> {
        self.index.clear();
        std::mem::take(&mut self.order)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
