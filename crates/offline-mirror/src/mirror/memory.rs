//! MemoryCollection: the in-memory reactive document collection.
//!
//! These are the unintercepted primitives: they touch only in-memory state and
//! raise a [`CollectionEvent`] per affected document. Persistence and ledger
//! bookkeeping are layered on top by `MirrorCollection`.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::query::{apply_modifier, execute_find, matches_selector, upsert_seed, FindOptions};
use crate::reactive::{CollectionEvent, EventEmitter, ListenerId};
use crate::types::{doc_id, Document, ID_FIELD};

/// Options for [`MemoryCollection::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Update every match instead of the first one.
    pub multi: bool,
    /// Insert a document seeded from the selector when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self {
            multi: false,
            upsert: true,
        }
    }
}

/// A document touched by an update, with its state before the update.
#[derive(Debug, Clone, PartialEq)]
pub struct Updated {
    pub id: String,
    /// `None` when the update inserted the document.
    pub previous: Option<Document>,
}

#[derive(Default)]
struct Docs {
    order: Vec<String>,
    by_id: HashMap<String, Document>,
}

impl Docs {
    fn put(&mut self, id: &str, doc: Document) -> Option<Document> {
        let old = self.by_id.insert(id.to_string(), doc);
        if old.is_none() {
            self.order.push(id.to_string());
        }
        old
    }

    fn take(&mut self, id: &str) -> Option<Document> {
        let old = self.by_id.remove(id)?;
        self.order.retain(|x| x != id);
        Some(old)
    }

    fn matching_ids(&self, selector: &Value, first_only: bool) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        for id in &self.order {
            let Some(doc) = self.by_id.get(id) else {
                continue;
            };
            if matches_selector(&Value::Object(doc.clone()), selector)? {
                ids.push(id.clone());
                if first_only {
                    break;
                }
            }
        }
        Ok(ids)
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Default)]
pub struct MemoryCollection {
    docs: Mutex<Docs>,
    events: EventEmitter<CollectionEvent>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new document, generating an `_id` if it has none.
    pub fn insert(&self, mut doc: Document) -> Result<String> {
        let id = match doc_id(&doc) {
            Some(id) => id.to_string(),
            None => {
                let id = new_id();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };
        {
            let mut docs = self.docs.lock();
            if docs.by_id.contains_key(&id) {
                return Err(QueryError::DuplicateId(id).into());
            }
            docs.put(&id, doc.clone());
        }
        self.events.emit(&CollectionEvent::Added {
            id: id.clone(),
            doc,
        });
        Ok(id)
    }

    /// Insert or replace a document by its `_id`.
    pub fn put(&self, doc: Document) -> Result<String> {
        let id = doc_id(&doc)
            .map(str::to_string)
            .ok_or_else(|| QueryError::InvalidModifier("document has no _id".to_string()))?;
        let old = self.docs.lock().put(&id, doc.clone());
        self.events.emit(&match old {
            Some(old) => CollectionEvent::Changed {
                id: id.clone(),
                doc,
                old,
            },
            None => CollectionEvent::Added {
                id: id.clone(),
                doc,
            },
        });
        Ok(id)
    }

    /// Apply `modifier` to the documents matching `selector`.
    ///
    /// Nothing is written unless the modifier applies cleanly to every match.
    pub fn update(
        &self,
        selector: &Value,
        modifier: &Document,
        options: UpdateOptions,
    ) -> Result<Vec<Updated>> {
        let mut events = Vec::new();
        let mut updated = Vec::new();
        {
            let mut docs = self.docs.lock();
            let ids = docs.matching_ids(selector, !options.multi)?;

            if ids.is_empty() {
                if !options.upsert {
                    return Ok(Vec::new());
                }
                let mut doc = apply_modifier(&upsert_seed(selector), modifier, true)?;
                let id = match doc_id(&doc) {
                    Some(id) => id.to_string(),
                    None => {
                        let id = new_id();
                        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                        id
                    }
                };
                docs.put(&id, doc.clone());
                events.push(CollectionEvent::Added {
                    id: id.clone(),
                    doc,
                });
                updated.push(Updated { id, previous: None });
            } else {
                let mut next = Vec::with_capacity(ids.len());
                for id in &ids {
                    if let Some(old) = docs.by_id.get(id) {
                        next.push((id.clone(), apply_modifier(old, modifier, false)?));
                    }
                }
                for (id, doc) in next {
                    let old = docs.put(&id, doc.clone());
                    if let Some(old) = old.clone() {
                        events.push(CollectionEvent::Changed {
                            id: id.clone(),
                            doc,
                            old,
                        });
                    }
                    updated.push(Updated { id, previous: old });
                }
            }
        }
        for event in &events {
            self.events.emit(event);
        }
        Ok(updated)
    }

    /// Remove one document by id.
    pub fn remove_id(&self, id: &str) -> Option<Document> {
        let doc = self.docs.lock().take(id)?;
        self.events.emit(&CollectionEvent::Removed {
            id: id.to_string(),
            doc: doc.clone(),
        });
        Some(doc)
    }

    /// Empty the collection. Returns how many documents were dropped.
    pub fn remove_all(&self) -> usize {
        let drained: Vec<(String, Document)> = {
            let mut docs = self.docs.lock();
            let order = std::mem::take(&mut docs.order);
            let mut by_id = std::mem::take(&mut docs.by_id);
            order
                .into_iter()
                .filter_map(|id| by_id.remove(&id).map(|doc| (id, doc)))
                .collect()
        };
        for (id, doc) in &drained {
            self.events.emit(&CollectionEvent::Removed {
                id: id.clone(),
                doc: doc.clone(),
            });
        }
        drained.len()
    }

    pub fn find(&self, selector: &Value, options: &FindOptions) -> Result<Vec<Document>> {
        let snapshot = self.snapshot();
        execute_find(&snapshot, selector, options)
    }

    pub fn find_one(&self, selector: &Value, options: &FindOptions) -> Result<Option<Document>> {
        let options = options.clone().limit(1);
        Ok(self.find(selector, &options)?.into_iter().next())
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.docs.lock().by_id.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.lock().by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.docs.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All documents in insertion order.
    pub fn snapshot(&self) -> Vec<Document> {
        let docs = self.docs.lock();
        docs.order
            .iter()
            .filter_map(|id| docs.by_id.get(id).cloned())
            .collect()
    }

    pub fn on_change(&self, callback: impl Fn(&CollectionEvent) + Send + Sync + 'static) -> ListenerId {
        self.events.on(callback)
    }

    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }
}
