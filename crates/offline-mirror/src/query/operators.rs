//! Selector evaluation for the in-memory collection.
//! Implements Mongo-style selector semantics with array lifting.

use std::cmp::Ordering;

use serde_json::{Map, Value};

use crate::codec::as_date;
use crate::error::{QueryError, Result};
use crate::types::ID_FIELD;

// ============================================================================
// Value Comparison
// ============================================================================

/// Compare two JSON values for ordering.
///
/// - Both Null → Equal
/// - a is Null → Greater (nulls sort to end)
/// - b is Null → Less
/// - Both dates → millisecond comparison
/// - Both numbers → f64 comparison (NaN treated as Equal)
/// - Both strings → lexicographic (codepoint order)
/// - Both booleans → false < true
/// - Cross-type → type rank: number(0), string(1), date(2), bool(3), other(4)
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    if let (Some(da), Some(db)) = (as_date(a), as_date(b)) {
        return da.cmp(&db);
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(na), Value::Number(nb)) => {
            let fa = na.as_f64().unwrap_or(f64::NAN);
            let fb = nb.as_f64().unwrap_or(f64::NAN);
            fa.partial_cmp(&fb).unwrap_or(Ordering::Equal)
        }
        (Value::String(sa), Value::String(sb)) => sa.cmp(sb),
        (Value::Bool(ba), Value::Bool(bb)) => ba.cmp(bb),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(v: &Value) -> u8 {
    if as_date(v).is_some() {
        return 2;
    }
    match v {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 3,
        _ => 4,
    }
}

/// Numbers compare by value (`1` equals `1.0`), everything else structurally.
pub fn deep_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(na), Value::Number(nb)) => na.as_f64() == nb.as_f64(),
        (Value::Array(xa), Value::Array(xb)) => {
            xa.len() == xb.len() && xa.iter().zip(xb).all(|(x, y)| deep_equals(x, y))
        }
        (Value::Object(oa), Value::Object(ob)) => {
            oa.len() == ob.len()
                && oa
                    .iter()
                    .all(|(k, v)| ob.get(k).map(|w| deep_equals(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

// ============================================================================
// Operator Detection
// ============================================================================

/// True for a non-empty object whose keys all start with `$`.
/// Tagged dates are values, not operator objects.
pub fn is_operator(value: &Value) -> bool {
    if as_date(value).is_some() {
        return false;
    }
    match value.as_object() {
        Some(obj) if !obj.is_empty() => obj.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

// ============================================================================
// Field Path Resolution
// ============================================================================

/// Get a nested value using a dot-separated path.
pub fn get_field_value<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for part in path.split('.') {
        current = match current {
            Value::Object(obj) => obj.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

// ============================================================================
// Operator Evaluation
// ============================================================================

fn build_regex(pattern: &str, options: Option<&str>) -> Result<regex::Regex> {
    let mut builder = regex::RegexBuilder::new(pattern);
    if let Some(opts) = options {
        builder
            .case_insensitive(opts.contains('i'))
            .multi_line(opts.contains('m'))
            .dot_matches_new_line(opts.contains('s'));
    }
    builder
        .build()
        .map_err(|e| QueryError::InvalidRegex(e.to_string()).into())
}

/// Evaluate a single scalar operator (no array lifting).
fn evaluate_scalar_operator(
    value: &Value,
    op: &str,
    operand: &Value,
    ops: &Map<String, Value>,
) -> Result<bool> {
    match op {
        "$eq" => Ok(deep_equals(value, operand)),

        "$ne" => Ok(!deep_equals(value, operand)),

        "$gt" | "$gte" | "$lt" | "$lte" => {
            if value.is_null() || operand.is_null() {
                return Ok(false);
            }
            let cmp = compare_values(value, operand);
            Ok(match op {
                "$gt" => cmp == Ordering::Greater,
                "$gte" => cmp != Ordering::Less,
                "$lt" => cmp == Ordering::Less,
                _ => cmp != Ordering::Greater,
            })
        }

        "$in" => {
            let items = match operand.as_array() {
                Some(a) => a,
                None => return Ok(false),
            };
            if let Some(arr) = value.as_array() {
                return Ok(arr
                    .iter()
                    .any(|v| items.iter().any(|item| deep_equals(v, item))));
            }
            Ok(items.iter().any(|item| deep_equals(value, item)))
        }

        "$nin" => {
            let items = match operand.as_array() {
                Some(a) => a,
                None => return Ok(true),
            };
            if let Some(arr) = value.as_array() {
                return Ok(!arr
                    .iter()
                    .any(|v| items.iter().any(|item| deep_equals(v, item))));
            }
            Ok(!items.iter().any(|item| deep_equals(value, item)))
        }

        "$regex" => {
            let Some(text) = value.as_str() else {
                return Ok(false);
            };
            let Some(pattern) = operand.as_str() else {
                return Ok(false);
            };
            let options = ops.get("$options").and_then(Value::as_str);
            Ok(build_regex(pattern, options)?.is_match(text))
        }

        // Consumed by `$regex`.
        "$options" => Ok(true),

        "$size" => {
            let Some(arr) = value.as_array() else {
                return Ok(false);
            };
            Ok(operand.as_f64().map(|n| arr.len() as f64 == n).unwrap_or(false))
        }

        "$all" => {
            let (Some(arr), Some(targets)) = (value.as_array(), operand.as_array()) else {
                return Ok(false);
            };
            Ok(targets
                .iter()
                .all(|t| arr.iter().any(|item| deep_equals(item, t))))
        }

        "$not" => {
            let negated = if is_operator(operand) {
                evaluate_operators(value, operand.as_object().into_iter().flatten())?
            } else if let Some(pattern) = operand.as_str() {
                value
                    .as_str()
                    .map(|s| build_regex(pattern, None).map(|re| re.is_match(s)))
                    .transpose()?
                    .unwrap_or(false)
            } else {
                deep_equals(value, operand)
            };
            Ok(!negated)
        }

        other => Err(QueryError::UnknownOperator(other.to_string()).into()),
    }
}

/// Liftable operators: when value is an array and operand is scalar, ANY element must match.
const LIFTABLE_OPS: &[&str] = &["$eq", "$gt", "$gte", "$lt", "$lte", "$regex"];
/// Inverted liftable operators: when value is an array, ALL elements must match.
const LIFTABLE_INVERTED_OPS: &[&str] = &["$ne"];

fn evaluate_single_operator(
    value: &Value,
    op: &str,
    operand: &Value,
    ops: &Map<String, Value>,
) -> Result<bool> {
    if let Some(arr) = value.as_array() {
        if !operand.is_array() {
            if LIFTABLE_OPS.contains(&op) {
                for elem in arr {
                    if evaluate_scalar_operator(elem, op, operand, ops)? {
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            if LIFTABLE_INVERTED_OPS.contains(&op) {
                for elem in arr {
                    if !evaluate_scalar_operator(elem, op, operand, ops)? {
                        return Ok(false);
                    }
                }
                return Ok(true);
            }
        }
    }
    evaluate_scalar_operator(value, op, operand, ops)
}

/// Evaluate an operator object `{ $op: operand, ... }` against a value.
fn evaluate_operators<'a>(
    value: &Value,
    ops: impl IntoIterator<Item = (&'a String, &'a Value)>,
) -> Result<bool> {
    let ops: Map<String, Value> = ops
        .into_iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (op, operand) in &ops {
        if !evaluate_single_operator(value, op, operand, &ops)? {
            return Ok(false);
        }
    }
    Ok(true)
}

// ============================================================================
// Selector Evaluation
// ============================================================================

/// Normalize a selector: a bare string selects by `_id`.
pub fn normalize_selector(selector: &Value) -> Value {
    match selector {
        Value::String(id) => {
            let mut m = Map::new();
            m.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            Value::Object(m)
        }
        other => other.clone(),
    }
}

/// Evaluate a Mongo-style selector against a document.
///
/// Logical operators (`$and`, `$or`, `$nor`) are evaluated first; then field
/// conditions (implicit AND). A non-object selector matches everything.
pub fn matches_selector(record: &Value, selector: &Value) -> Result<bool> {
    if let Value::String(id) = selector {
        return Ok(record.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str()));
    }
    let filter_obj = match selector.as_object() {
        Some(o) => o,
        None => return Ok(true),
    };

    if let Some(subs) = filter_obj.get("$and").and_then(Value::as_array) {
        for sub in subs {
            if !matches_selector(record, sub)? {
                return Ok(false);
            }
        }
    }

    if let Some(subs) = filter_obj.get("$or").and_then(Value::as_array) {
        let mut any_match = false;
        for sub in subs {
            if matches_selector(record, sub)? {
                any_match = true;
                break;
            }
        }
        if !any_match {
            return Ok(false);
        }
    }

    if let Some(subs) = filter_obj.get("$nor").and_then(Value::as_array) {
        for sub in subs {
            if matches_selector(record, sub)? {
                return Ok(false);
            }
        }
    }

    for (key, field_filter) in filter_obj {
        if key.starts_with('$') {
            continue;
        }

        // $exists needs to tell present-but-null apart from absent.
        if is_operator(field_filter) {
            if let Some(ops_obj) = field_filter.as_object() {
                if let Some(exists_operand) = ops_obj.get("$exists") {
                    let value_opt = get_field_value(record, key);
                    let want_exists = exists_operand.as_bool().unwrap_or(false);
                    if want_exists != value_opt.is_some() {
                        return Ok(false);
                    }
                    let remaining = ops_obj.iter().filter(|(k, _)| *k != "$exists");
                    let value = value_opt.unwrap_or(&Value::Null);
                    if !evaluate_operators(value, remaining)? {
                        return Ok(false);
                    }
                    continue;
                }
            }
        }

        let value = get_field_value(record, key).unwrap_or(&Value::Null);
        let matched = match field_filter.as_object() {
            Some(ops) if is_operator(field_filter) => evaluate_operators(value, ops)?,
            _ => evaluate_single_operator(value, "$eq", field_filter, &Map::new())?,
        };
        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}
