//! Dotted-path access into documents.

use serde_json::{Map, Value};

use crate::types::Document;

/// Split a dotted path into its segments.
pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('.').collect()
}

pub(crate) fn get_path<'a>(doc: &'a Document, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = doc.get(*first)?;
    for part in rest {
        current = current.as_object()?.get(*part)?;
    }
    Some(current)
}

pub(crate) fn set_path(doc: &mut Document, path: &[&str], value: Value) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = doc;
    for part in parents {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

pub(crate) fn remove_path(doc: &mut Document, path: &[&str]) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };
    let mut current = doc;
    for part in parents {
        match current.get_mut(*part) {
            Some(Value::Object(next)) => current = next,
            _ => return,
        }
    }
    current.remove(*last);
}

/// Mutable access to the value at `path`, creating intermediate objects.
pub(crate) fn entry_path<'a>(doc: &'a mut Document, path: &[&str]) -> Option<&'a mut Value> {
    let (last, parents) = path.split_last()?;
    let mut current = doc;
    for part in parents {
        let entry = current
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(next) => current = next,
            _ => return None,
        }
    }
    Some(current.entry(last.to_string()).or_insert(Value::Null))
}
