//! End-to-end tests: seeded repository, orchestrator and JSONL trigger output

use geofence_trigger::domain::types::{EventTimestamp, GeoPoint, IncomingEvent};
use geofence_trigger::infra::{Config, Metrics};
use geofence_trigger::io::mqtt::parse_incoming_events;
use geofence_trigger::io::{JsonlTriggerPublisher, JsonlWriter, MemoryRepository, SeedData};
use geofence_trigger::services::{create_event_pipeline, EventOutcome, Orchestrator};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const STORE: &str = "springfield";

const INSIDE_BOTH: GeoPoint = GeoPoint { latitude: 36.650717, longitude: -93.220024 };
const INSIDE_OUTER_ONLY: GeoPoint = GeoPoint { latitude: 36.622237, longitude: -93.218270 };
const OUTSIDE_ALL: GeoPoint = GeoPoint { latitude: 36.622237, longitude: 93.218270 };

fn fixture(name: &str) -> Value {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
    let content = std::fs::read_to_string(&path).unwrap();
    serde_json::from_str(&content).unwrap()
}

fn seed() -> SeedData {
    serde_json::from_value(json!({
        "stores": [{"name": STORE}],
        "geofences": {
            STORE: [
                {"id": "gf-120", "rangeType": "time", "range": 120, "shape": fixture("time_120_poly.json")},
                {"id": "gf-300", "rangeType": "time", "range": 300, "shape": fixture("time_300_poly.json")}
            ]
        }
    }))
    .unwrap()
}

fn event(order_id: &str, ts: i64, location: GeoPoint) -> IncomingEvent {
    IncomingEvent {
        order_id: order_id.to_string(),
        store_name: STORE.to_string(),
        event_location: location,
        event_timestamp: EventTimestamp(ts),
    }
}

fn read_lines(path: &Path) -> Vec<Value> {
    match std::fs::read_to_string(path) {
        Ok(content) => content.lines().map(|l| serde_json::from_str(l).unwrap()).collect(),
        Err(_) => Vec::new(),
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator<MemoryRepository, JsonlTriggerPublisher>>,
    repository: Arc<MemoryRepository>,
    triggers_path: std::path::PathBuf,
    events_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempdir().unwrap();
    let triggers_path = dir.path().join("triggers.jsonl");
    let events_path = dir.path().join("events.jsonl");

    let repository = Arc::new(
        MemoryRepository::from_seed(seed()).with_event_log(JsonlWriter::new(&events_path)),
    );
    let publisher = Arc::new(JsonlTriggerPublisher::new(JsonlWriter::new(&triggers_path)));
    let orchestrator = Arc::new(Orchestrator::new(
        &Config::default(),
        repository.clone(),
        publisher,
        Arc::new(Metrics::new()),
    ));
    Harness { orchestrator, repository, triggers_path, events_path, _dir: dir }
}

#[tokio::test]
async fn test_enter_exit_repeat_publishes_two_triggers() {
    let h = harness();

    // E1: inside both geofences, new order
    let e1 = h.orchestrator.handle_event(&event("order-1", 1000, INSIDE_BOTH)).await;
    assert!(e1.triggered());
    // E2: outside both
    let e2 = h.orchestrator.handle_event(&event("order-1", 2000, OUTSIDE_ALL)).await;
    assert!(e2.triggered());
    // E3: same place again
    let e3 = h.orchestrator.handle_event(&event("order-1", 3000, OUTSIDE_ALL)).await;
    assert!(matches!(e3, EventOutcome::Applied { triggered: false, .. }));

    let triggers = read_lines(&h.triggers_path);
    assert_eq!(triggers.len(), 2);

    let first = &triggers[0];
    assert!(first["messageId"].is_string());
    assert_eq!(first["orderId"], "order-1");
    assert_eq!(first["storeName"], STORE);
    assert_eq!(first["status"], json!(["open"]));
    assert!(first.get("priorEvent").is_none());
    assert!(first.get("revision").is_none());
    assert_eq!(first["latestEvent"]["innerGeofence"]["range"], 120.0);
    assert_eq!(
        first["latestEvent"]["geofences"],
        json!([
            {"rangeType": "time", "range": 120.0, "intersectsEvent": true},
            {"rangeType": "time", "range": 300.0, "intersectsEvent": true}
        ])
    );

    let second = &triggers[1];
    assert_eq!(second["priorEvent"], first["latestEvent"]);
    assert!(second["latestEvent"].get("innerGeofence").is_none());
    assert_eq!(second["latestEvent"]["eventTimestamp"], 2000);

    let order = h.repository.order("order-1", STORE).unwrap();
    assert_eq!(order.latest_timestamp(), Some(EventTimestamp(3000)));
    assert_eq!(read_lines(&h.events_path).len(), 3);
}

#[tokio::test]
async fn test_redelivered_event_publishes_nothing() {
    let h = harness();

    h.orchestrator.handle_event(&event("order-5", 1000, INSIDE_BOTH)).await;
    let e2 = event("order-5", 2000, OUTSIDE_ALL);
    assert!(h.orchestrator.handle_event(&e2).await.triggered());

    // Same location, same timestamp
    let e3 = h.orchestrator.handle_event(&e2).await;
    assert!(matches!(e3, EventOutcome::Applied { triggered: false, message_id: None }));

    assert_eq!(read_lines(&h.triggers_path).len(), 2);
    let order = h.repository.order("order-5", STORE).unwrap();
    assert_eq!(order.latest_timestamp(), Some(EventTimestamp(2000)));
    assert_eq!(read_lines(&h.events_path).len(), 3);
}

#[tokio::test]
async fn test_outer_ring_then_inner_ring() {
    let h = harness();

    h.orchestrator.handle_event(&event("order-2", 1000, INSIDE_OUTER_ONLY)).await;
    h.orchestrator.handle_event(&event("order-2", 2000, INSIDE_BOTH)).await;

    let triggers = read_lines(&h.triggers_path);
    assert_eq!(triggers.len(), 2);
    assert_eq!(triggers[0]["latestEvent"]["innerGeofence"]["range"], 300.0);
    assert_eq!(triggers[1]["latestEvent"]["innerGeofence"]["range"], 120.0);
    assert_eq!(triggers[1]["priorEvent"]["innerGeofence"]["range"], 300.0);
}

#[tokio::test]
async fn test_stale_event_changes_nothing() {
    let h = harness();

    h.orchestrator.handle_event(&event("order-3", 1000, INSIDE_BOTH)).await;
    let before = h.repository.order("order-3", STORE).unwrap();

    let outcome = h.orchestrator.handle_event(&event("order-3", 500, OUTSIDE_ALL)).await;
    assert!(matches!(outcome, EventOutcome::RejectedStale { .. }));

    assert_eq!(h.repository.order("order-3", STORE).unwrap(), before);
    assert_eq!(read_lines(&h.triggers_path).len(), 1);
    assert_eq!(read_lines(&h.events_path).len(), 1);
}

#[tokio::test]
async fn test_unknown_store_is_dropped() {
    let h = harness();

    let mut e = event("order-4", 1000, INSIDE_BOTH);
    e.store_name = "shelbyville".to_string();
    let outcome = h.orchestrator.handle_event(&e).await;

    assert!(matches!(outcome, EventOutcome::Failed(_)));
    assert_eq!(h.repository.order_count(), 0);
    assert!(read_lines(&h.triggers_path).is_empty());
    assert!(read_lines(&h.events_path).is_empty());
}

#[tokio::test]
async fn test_ingest_payload_through_pipeline() {
    let h = harness();

    let payload = json!([
        {"orderId": "a", "storeName": STORE, "eventLocation": {"latitude": 36.650717, "longitude": -93.220024}, "eventTimestamp": 1000},
        {"orderId": "b", "storeName": STORE, "eventLocation": {"latitude": 36.622237, "longitude": -93.218270}, "eventTimestamp": 1000},
        {"orderId": "c", "storeName": STORE, "eventLocation": {"latitude": 36.622237, "longitude": 93.218270}, "eventTimestamp": "2026-01-05T16:41:30.048+00:00"},
        {"orderId": "broken"}
    ])
    .to_string();
    let parsed = parse_incoming_events(&payload);
    assert_eq!(parsed.invalid, 1);

    let (tx, pipeline) = create_event_pipeline(h.orchestrator.clone(), 16, 4);
    let handle = tokio::spawn(pipeline.run());
    for e in parsed.events {
        tx.send(e).await.unwrap();
    }
    drop(tx);
    let stats = handle.await.unwrap();

    assert_eq!(stats.dispatched, 3);
    assert_eq!(stats.triggered, 3);
    assert_eq!(h.repository.order_count(), 3);

    let c = h.repository.order("c", STORE).unwrap();
    let latest = c.latest_event.unwrap();
    assert!(latest.inner_geofence.is_none());
    assert!(latest.geofences.iter().all(|g| !g.intersects_event));
}
