//! Query layer for the in-memory collection.
//!
//! - [`operators`]: selector matching and value comparison.
//! - [`execute`]: filter, sort, skip/limit and projection.
//! - [`modifier`]: update modifiers and upsert seeding.
//! - [`merge`]: recursive merge used when mirroring changed documents.

pub mod execute;
pub mod merge;
pub mod modifier;
pub mod operators;
mod path;
pub mod projection;
pub mod types;

pub use execute::{execute_find, sort_records};
pub use merge::deep_merge;
pub use modifier::{apply_modifier, is_operator_modifier, upsert_seed};
pub use operators::{compare_values, deep_equals, matches_selector, normalize_selector};
pub use projection::apply_projection;
pub use types::{FindOptions, SortDirection, SortEntry};
