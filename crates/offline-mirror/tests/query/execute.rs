//! Tests for find execution: filtering, sorting, paging and projection.

use offline_mirror::query::{execute_find, FindOptions, SortEntry};
use offline_mirror::Document;
use serde_json::{json, Value};

fn docs(values: Vec<Value>) -> Vec<Document> {
    values.into_iter().filter_map(|v| v.as_object().cloned()).collect()
}

fn ids(found: &[Document]) -> Vec<&str> {
    found.iter().filter_map(|d| d["_id"].as_str()).collect()
}

fn todos() -> Vec<Document> {
    docs(vec![
        json!({ "_id": "a", "title": "buy milk", "prio": 2, "done": false, "tags": ["home"] }),
        json!({ "_id": "b", "title": "write report", "prio": 1, "done": true, "tags": ["work", "urgent"] }),
        json!({ "_id": "c", "title": "call bob", "prio": 3, "done": false }),
        json!({ "_id": "d", "title": "pay rent", "done": false, "tags": ["home", "urgent"] }),
    ])
}

#[test]
fn empty_selector_returns_natural_order() {
    let all = todos();
    let found = execute_find(&all, &json!({}), &FindOptions::default()).unwrap();
    assert_eq!(ids(&found), vec!["a", "b", "c", "d"]);
}

#[test]
fn string_selector_matches_id() {
    let all = todos();
    let found = execute_find(&all, &json!("c"), &FindOptions::default()).unwrap();
    assert_eq!(ids(&found), vec!["c"]);
}

#[test]
fn missing_sort_fields_order_after_values() {
    let all = todos();
    let asc = execute_find(&all, &json!({}), &FindOptions::default().sorted(SortEntry::asc("prio"))).unwrap();
    assert_eq!(ids(&asc), vec!["b", "a", "c", "d"]);

    let desc = execute_find(&all, &json!({}), &FindOptions::default().sorted(SortEntry::desc("prio"))).unwrap();
    assert_eq!(ids(&desc), vec!["d", "c", "a", "b"]);
}

#[test]
fn secondary_sort_breaks_ties() {
    let all = todos();
    let opts = FindOptions::default()
        .sorted(SortEntry::asc("done"))
        .sorted(SortEntry::desc("title"));
    let found = execute_find(&all, &json!({}), &opts).unwrap();
    assert_eq!(ids(&found), vec!["d", "c", "a", "b"]);
}

#[test]
fn skip_and_limit_page_after_sorting() {
    let all = todos();
    let opts = FindOptions::default().sorted(SortEntry::asc("_id")).skip(1).limit(2);
    let found = execute_find(&all, &json!({}), &opts).unwrap();
    assert_eq!(ids(&found), vec!["b", "c"]);
}

#[test]
fn array_fields_match_any_element() {
    let all = todos();
    let found = execute_find(&all, &json!({ "tags": "urgent" }), &FindOptions::default()).unwrap();
    assert_eq!(ids(&found), vec!["b", "d"]);
}

#[test]
fn projection_inclusion_keeps_id() {
    let all = todos();
    let found = execute_find(&all, &json!("a"), &FindOptions::projection(json!({ "title": 1 }))).unwrap();
    assert_eq!(Value::Object(found[0].clone()), json!({ "_id": "a", "title": "buy milk" }));
}

#[test]
fn projection_exclusion_drops_fields() {
    let all = todos();
    let found = execute_find(
        &all,
        &json!("c"),
        &FindOptions::projection(json!({ "_id": 0, "prio": 0, "done": 0 })),
    )
    .unwrap();
    assert_eq!(Value::Object(found[0].clone()), json!({ "title": "call bob" }));
}

#[test]
fn dates_sort_chronologically() {
    let all = docs(vec![
        json!({ "_id": "late", "at": { "$date": 3_000 } }),
        json!({ "_id": "early", "at": { "$date": 1_000 } }),
        json!({ "_id": "mid", "at": { "$date": 2_000 } }),
    ]);
    let found = execute_find(&all, &json!({}), &FindOptions::default().sorted(SortEntry::asc("at"))).unwrap();
    assert_eq!(ids(&found), vec!["early", "mid", "late"]);

    let after = execute_find(&all, &json!({ "at": { "$gt": { "$date": 1_500 } } }), &FindOptions::default()).unwrap();
    assert_eq!(ids(&after), vec!["late", "mid"]);
}

#[test]
fn unknown_operator_is_an_error() {
    let all = todos();
    assert!(execute_find(&all, &json!({ "prio": { "$near": 1 } }), &FindOptions::default()).is_err());
}
