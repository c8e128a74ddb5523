//! Find execution: scan-and-filter with sorting, pagination and projection.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::Result;
use crate::types::Document;

use super::operators::{compare_values, get_field_value, matches_selector};
use super::projection::apply_projection;
use super::types::{FindOptions, SortDirection, SortEntry};

/// Sort records by multiple fields with cascading priority.
pub fn sort_records(records: &mut [Value], sort: &[SortEntry]) {
    if sort.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        for entry in sort {
            let va = get_field_value(a, &entry.field).unwrap_or(&Value::Null);
            let vb = get_field_value(b, &entry.field).unwrap_or(&Value::Null);
            let cmp = compare_values(va, vb);
            if cmp != Ordering::Equal {
                return if entry.direction == SortDirection::Desc {
                    cmp.reverse()
                } else {
                    cmp
                };
            }
        }
        Ordering::Equal
    });
}

/// Run a find over `docs` (in natural order).
///
/// 1. Filter by selector.
/// 2. Sort.
/// 3. Skip then limit.
/// 4. Project.
pub fn execute_find<'a>(
    docs: impl IntoIterator<Item = &'a Document>,
    selector: &Value,
    options: &FindOptions,
) -> Result<Vec<Document>> {
    let mut matched = Vec::new();
    for doc in docs {
        let record = Value::Object(doc.clone());
        if matches_selector(&record, selector)? {
            matched.push(record);
        }
    }

    sort_records(&mut matched, &options.sort);

    let skip = options.skip.unwrap_or(0);
    let limit = options.limit.unwrap_or(usize::MAX);
    let page = matched.into_iter().skip(skip).take(limit).filter_map(|v| match v {
        Value::Object(m) => Some(m),
        _ => None,
    });

    Ok(match &options.fields {
        Some(fields) => page.map(|d| apply_projection(&d, fields)).collect(),
        None => page.collect(),
    })
}
