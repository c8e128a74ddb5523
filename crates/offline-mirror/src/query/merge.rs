//! Recursive document merge.

use serde_json::Value;

use crate::codec::as_date;
use crate::types::Document;

/// Merge `source` into `target`, returning the result.
///
/// Nested objects merge key by key and arrays merge by index. Scalars in
/// `source` replace those in `target`, `null` included. Dates are treated as
/// scalars.
pub fn deep_merge(target: &Document, source: &Document) -> Document {
    let mut out = target.clone();
    for (key, value) in source {
        match out.get_mut(key) {
            Some(existing) => merge_value(existing, value),
            None => {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out
}

fn merge_value(target: &mut Value, source: &Value) {
    if as_date(target).is_some() || as_date(source).is_some() {
        *target = source.clone();
        return;
    }
    match (target, source) {
        (Value::Object(t), Value::Object(s)) => {
            for (key, value) in s {
                match t.get_mut(key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        t.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(t), Value::Array(s)) => {
            for (i, value) in s.iter().enumerate() {
                match t.get_mut(i) {
                    Some(existing) => merge_value(existing, value),
                    None => t.push(value.clone()),
                }
            }
        }
        (t, s) => *t = s.clone(),
    }
}
