//! Tests for selector operators.

use offline_mirror::query::{matches_selector, normalize_selector};
use serde_json::json;

fn matches(record: serde_json::Value, selector: serde_json::Value) -> bool {
    matches_selector(&record, &selector).unwrap()
}

#[test]
fn comparison_operators() {
    let r = json!({ "n": 5 });
    assert!(matches(r.clone(), json!({ "n": { "$gt": 4 } })));
    assert!(matches(r.clone(), json!({ "n": { "$gte": 5, "$lte": 5 } })));
    assert!(!matches(r.clone(), json!({ "n": { "$lt": 5 } })));
    assert!(matches(r.clone(), json!({ "n": { "$ne": 4 } })));
    assert!(matches(r, json!({ "n": 5.0 })));
}

#[test]
fn null_never_satisfies_range_operators() {
    assert!(!matches(json!({ "n": null }), json!({ "n": { "$gt": 0 } })));
    assert!(!matches(json!({}), json!({ "n": { "$lt": 0 } })));
}

#[test]
fn membership_operators() {
    let r = json!({ "status": "open", "tags": ["a", "b"] });
    assert!(matches(r.clone(), json!({ "status": { "$in": ["open", "closed"] } })));
    assert!(!matches(r.clone(), json!({ "status": { "$nin": ["open"] } })));
    assert!(matches(r.clone(), json!({ "tags": { "$in": ["b", "z"] } })));
    assert!(matches(r.clone(), json!({ "tags": { "$all": ["a", "b"] } })));
    assert!(!matches(r.clone(), json!({ "tags": { "$all": ["a", "c"] } })));
    assert!(matches(r, json!({ "tags": { "$size": 2 } })));
}

#[test]
fn exists_distinguishes_null_from_missing() {
    let r = json!({ "a": null });
    assert!(matches(r.clone(), json!({ "a": { "$exists": true } })));
    assert!(!matches(r.clone(), json!({ "b": { "$exists": true } })));
    assert!(matches(r, json!({ "b": { "$exists": false } })));
}

#[test]
fn regex_with_options() {
    let r = json!({ "title": "Buy Milk" });
    assert!(matches(r.clone(), json!({ "title": { "$regex": "^buy", "$options": "i" } })));
    assert!(!matches(r.clone(), json!({ "title": { "$regex": "^buy" } })));
    assert!(matches(r, json!({ "title": { "$not": { "$regex": "^sell" } } })));
}

#[test]
fn invalid_regex_is_an_error() {
    assert!(matches_selector(&json!({ "t": "x" }), &json!({ "t": { "$regex": "(" } })).is_err());
}

#[test]
fn logical_operators() {
    let r = json!({ "a": 1, "b": 2 });
    assert!(matches(r.clone(), json!({ "$and": [{ "a": 1 }, { "b": 2 }] })));
    assert!(matches(r.clone(), json!({ "$or": [{ "a": 9 }, { "b": 2 }] })));
    assert!(!matches(r.clone(), json!({ "$or": [{ "a": 9 }, { "b": 9 }] })));
    assert!(!matches(r.clone(), json!({ "$nor": [{ "a": 1 }] })));
    assert!(matches(r, json!({ "$nor": [{ "a": 9 }] })));
}

#[test]
fn dotted_paths_reach_nested_fields() {
    let r = json!({ "owner": { "name": "ana", "team": { "id": 7 } } });
    assert!(matches(r.clone(), json!({ "owner.team.id": 7 })));
    assert!(!matches(r, json!({ "owner.team.id": 8 })));
}

#[test]
fn whole_object_equality() {
    let r = json!({ "o": { "x": 1, "y": 2 } });
    assert!(matches(r.clone(), json!({ "o": { "y": 2, "x": 1 } })));
    assert!(!matches(r, json!({ "o": { "x": 1 } })));
}

#[test]
fn normalize_wraps_bare_id() {
    assert_eq!(normalize_selector(&json!("abc")), json!({ "_id": "abc" }));
    assert_eq!(normalize_selector(&json!({ "a": 1 })), json!({ "a": 1 }));
}
