//! Find options: sort, skip, limit and projection.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sort direction for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A sort specification for a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub field: String,
    pub direction: SortDirection,
}

impl SortEntry {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Options accepted by `find` / `find_one`.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Vec<SortEntry>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    /// Mongo-style field projection (`{ "title": 1 }` or `{ "secret": 0 }`).
    pub fields: Option<Value>,
}

impl FindOptions {
    /// Options carrying only a projection.
    pub fn projection(fields: Value) -> Self {
        Self {
            fields: Some(fields),
            ..Self::default()
        }
    }

    pub fn sorted(mut self, entry: SortEntry) -> Self {
        self.sort.push(entry);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = Some(n);
        self
    }
}
