//! Update modifiers and upsert seeding.
//!
//! A modifier is either an operator document (`{ "$set": {...}, "$inc": {...} }`)
//! or a plain replacement document. Replacements keep the target's `_id`.

use serde_json::{Map, Value};

use crate::error::{QueryError, Result};
use crate::types::{Document, ID_FIELD};

use super::operators::{deep_equals, is_operator, matches_selector};
use super::path::{entry_path, get_path, remove_path, segments, set_path};

fn invalid(msg: impl Into<String>) -> crate::error::MirrorError {
    QueryError::InvalidModifier(msg.into()).into()
}

/// True if the modifier is made of `$` operators only.
pub fn is_operator_modifier(modifier: &Document) -> Result<bool> {
    let ops = modifier.keys().filter(|k| k.starts_with('$')).count();
    if ops == 0 {
        Ok(false)
    } else if ops == modifier.len() {
        Ok(true)
    } else {
        Err(invalid("cannot mix update operators and plain fields"))
    }
}

/// Apply `modifier` to `doc` and return the new document.
///
/// `inserting` enables `$setOnInsert` (used by upserts).
pub fn apply_modifier(doc: &Document, modifier: &Document, inserting: bool) -> Result<Document> {
    if !is_operator_modifier(modifier)? {
        let mut replaced = modifier.clone();
        match (doc.get(ID_FIELD), replaced.get(ID_FIELD)) {
            (Some(old), Some(new)) if !deep_equals(old, new) => {
                return Err(invalid("replacement cannot change _id"));
            }
            (Some(old), None) => {
                replaced.insert(ID_FIELD.to_string(), old.clone());
            }
            _ => {}
        }
        return Ok(replaced);
    }

    let mut out = doc.clone();
    for (op, args) in modifier {
        let fields = args
            .as_object()
            .ok_or_else(|| invalid(format!("{op} expects an object")))?;
        for (field, arg) in fields {
            if field == ID_FIELD && op != "$setOnInsert" {
                let unchanged = op == "$set" && doc.get(ID_FIELD).map_or(true, |v| deep_equals(v, arg));
                if !unchanged {
                    return Err(invalid("the _id field cannot be modified"));
                }
            }
            apply_operator(&mut out, op, field, arg, inserting)?;
        }
    }
    Ok(out)
}

fn apply_operator(
    doc: &mut Document,
    op: &str,
    field: &str,
    arg: &Value,
    inserting: bool,
) -> Result<()> {
    let path = segments(field);
    match op {
        "$set" => set_path(doc, &path, arg.clone()),

        "$setOnInsert" => {
            if inserting {
                set_path(doc, &path, arg.clone());
            }
        }

        "$unset" => remove_path(doc, &path),

        "$inc" => {
            let by = arg
                .as_f64()
                .ok_or_else(|| invalid(format!("$inc of \"{field}\" needs a number")))?;
            let current = match get_path(doc, &path) {
                None | Some(Value::Null) => 0.0,
                Some(v) => v
                    .as_f64()
                    .ok_or_else(|| invalid(format!("cannot $inc non-number \"{field}\"")))?,
            };
            let both_int = arg.is_i64() && get_path(doc, &path).map_or(true, Value::is_i64);
            let next = if both_int {
                Value::from(current as i64 + by as i64)
            } else {
                Value::from(current + by)
            };
            set_path(doc, &path, next);
        }

        "$push" | "$addToSet" => {
            let items: Vec<Value> = match arg.as_object().and_then(|o| o.get("$each")) {
                Some(Value::Array(each)) => each.clone(),
                Some(_) => return Err(invalid("$each expects an array")),
                None => vec![arg.clone()],
            };
            let slot = entry_path(doc, &path)
                .ok_or_else(|| invalid(format!("cannot {op} into \"{field}\"")))?;
            if slot.is_null() {
                *slot = Value::Array(Vec::new());
            }
            let arr = slot
                .as_array_mut()
                .ok_or_else(|| invalid(format!("cannot {op} to non-array \"{field}\"")))?;
            for item in items {
                if op == "$addToSet" && arr.iter().any(|v| deep_equals(v, &item)) {
                    continue;
                }
                arr.push(item);
            }
        }

        "$pull" => {
            let Some(Value::Array(_)) = get_path(doc, &path) else {
                return Ok(());
            };
            let Some(Value::Array(arr)) = entry_path(doc, &path) else {
                return Ok(());
            };
            let mut kept = Vec::with_capacity(arr.len());
            for item in arr.drain(..) {
                let remove = if is_operator(arg) {
                    let mut wrapped = Map::new();
                    wrapped.insert("v".to_string(), item.clone());
                    let mut sel = Map::new();
                    sel.insert("v".to_string(), arg.clone());
                    matches_selector(&Value::Object(wrapped), &Value::Object(sel))?
                } else if arg.is_object() && item.is_object() && !is_operator(arg) {
                    matches_selector(&item, arg)?
                } else {
                    deep_equals(&item, arg)
                };
                if !remove {
                    kept.push(item);
                }
            }
            *arr = kept;
        }

        other => return Err(QueryError::UnknownOperator(other.to_string()).into()),
    }
    Ok(())
}

/// Seed document for an upsert miss: the selector's equality fields.
pub fn upsert_seed(selector: &Value) -> Document {
    let mut seed = Document::new();
    if let Value::String(id) = selector {
        seed.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        return seed;
    }
    let Some(obj) = selector.as_object() else {
        return seed;
    };
    for (field, cond) in obj {
        if field.starts_with('$') {
            continue;
        }
        let value = match cond.as_object().and_then(|o| o.get("$eq")) {
            Some(eq) if is_operator(cond) => eq.clone(),
            _ if is_operator(cond) => continue,
            _ => cond.clone(),
        };
        set_path(&mut seed, &segments(field), value);
    }
    if let Some(Value::Array(subs)) = obj.get("$and") {
        for sub in subs {
            for (k, v) in upsert_seed(sub) {
                seed.entry(k).or_insert(v);
            }
        }
    }
    seed
}
