//! Field projection for find results.

use serde_json::Value;

use crate::types::{Document, ID_FIELD};

use super::path::{get_path, remove_path, segments, set_path};

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::Null => false,
        _ => true,
    }
}

/// Apply a Mongo-style projection.
///
/// If any field other than `_id` is included, only included fields are
/// returned; otherwise listed fields are excluded. `_id` is kept unless it is
/// explicitly excluded. A non-object or empty projection returns the document.
pub fn apply_projection(doc: &Document, fields: &Value) -> Document {
    let Some(spec) = fields.as_object().filter(|o| !o.is_empty()) else {
        return doc.clone();
    };

    let keep_id = spec.get(ID_FIELD).map(is_truthy).unwrap_or(true);
    let inclusion = spec
        .iter()
        .any(|(k, v)| k != ID_FIELD && is_truthy(v));

    let mut out = if inclusion {
        let mut out = Document::new();
        for (field, flag) in spec {
            if field == ID_FIELD || !is_truthy(flag) {
                continue;
            }
            let path = segments(field);
            if let Some(v) = get_path(doc, &path) {
                set_path(&mut out, &path, v.clone());
            }
        }
        if let Some(id) = doc.get(ID_FIELD) {
            out.insert(ID_FIELD.to_string(), id.clone());
        }
        out
    } else {
        let mut out = doc.clone();
        for field in spec.keys().filter(|k| *k != ID_FIELD) {
            let path = segments(field);
            remove_path(&mut out, &path);
        }
        out
    };

    if !keep_id {
        out.remove(ID_FIELD);
    }
    out
}
