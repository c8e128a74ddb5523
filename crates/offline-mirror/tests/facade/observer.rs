//! Tests for mirroring canonical collection changes through the facade.

use offline_mirror::observer::{ObserveEvent, ObserverStats};
use offline_mirror::{ConnectionStatus, MirrorOptions};
use serde_json::json;

use super::support::{d, eventually, fixture, MockCanonical};

#[tokio::test]
async fn server_changes_reach_the_mirror() {
    let f = fixture(MirrorOptions::new("app"), ConnectionStatus::connected(), MockCanonical::default()).await;
    let events = f.canonical.events();
    let mirror = f.collection.mirror().clone();

    events
        .send(ObserveEvent::Added(d(json!({ "_id": "a", "title": "new", "tags": ["x"] }))))
        .await
        .unwrap();
    eventually(|| mirror.get("a").is_some()).await;
    assert!(f.kv.contains("a", mirror.store_handle()));

    events
        .send(ObserveEvent::Changed {
            new: d(json!({ "_id": "a", "title": "renamed" })),
            old: d(json!({ "_id": "a", "title": "new", "tags": ["x"] })),
        })
        .await
        .unwrap();
    eventually(|| mirror.get("a").map(|doc| doc["title"] == json!("renamed")).unwrap_or(false)).await;
    assert_eq!(mirror.get("a").unwrap()["tags"], json!(["x"]));

    events
        .send(ObserveEvent::Removed(d(json!({ "_id": "a" }))))
        .await
        .unwrap();
    eventually(|| mirror.get("a").is_none()).await;

    // Server-driven changes are never queued for upload.
    let record = mirror.ledger().snapshot();
    assert!(record.updated_docs.is_empty());
    assert!(record.removed_docs.is_empty());
    assert_eq!(
        f.collection.observer_stats(),
        Some(ObserverStats { added: 1, changed: 1, removed: 1 })
    );
}

#[tokio::test]
async fn observer_attaches_once_and_detaches() {
    let f = fixture(MirrorOptions::new("app"), ConnectionStatus::connected(), MockCanonical::default()).await;
    assert!(!f.collection.attach_observer());

    let events = f.canonical.events();
    events.send(ObserveEvent::Added(d(json!({ "_id": "a" })))).await.unwrap();
    let mirror = f.collection.mirror().clone();
    eventually(|| mirror.get("a").is_some()).await;

    let stats = f.collection.detach_observer().unwrap();
    assert_eq!(stats.added, 1);
    assert!(f.collection.observer_stats().is_none());
    assert!(f.collection.detach_observer().is_none());
}

#[tokio::test]
async fn removed_event_keeps_durable_copy_for_rehydration() {
    let f = fixture(MirrorOptions::new("app"), ConnectionStatus::connected(), MockCanonical::default()).await;
    let events = f.canonical.events();
    let mirror = f.collection.mirror().clone();

    events.send(ObserveEvent::Added(d(json!({ "_id": "a", "v": 1 })))).await.unwrap();
    eventually(|| mirror.get("a").is_some()).await;
    events.send(ObserveEvent::Removed(d(json!({ "_id": "a" })))).await.unwrap();
    eventually(|| mirror.get("a").is_none()).await;

    assert!(mirror.rehydrate(true).await.unwrap());
    assert_eq!(mirror.get("a").unwrap()["v"], json!(1));
}

#[tokio::test]
async fn close_stops_mirroring() {
    let f = fixture(MirrorOptions::new("app"), ConnectionStatus::connected(), MockCanonical::default()).await;
    f.collection.close();
    assert!(f.collection.mirror().is_closed());
    assert!(f.collection.observer_stats().is_none());
}
