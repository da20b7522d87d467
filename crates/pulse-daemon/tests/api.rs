//! REST API tests, served in-process.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{DateTime, Utc};
use pulse_daemon::api::create_router;
use pulse_daemon::api::rest::state::AppState;
use pulse_daemon::ingest::StreamHealth;
use pulse_engine::{
    DeliveryError, DispatchWorker, EngineConfig, NotificationDispatcher, NotificationSink,
    PulseEngine,
};
use pulse_types::{EditRecord, SpikePayload};
use serde_json::Value;
use tokio::sync::watch;
use tower::ServiceExt;

struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _payload: &SpikePayload) -> Result<(), DeliveryError> {
        Ok(())
    }
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

struct TestApp {
    router: Router,
    _worker: DispatchWorker,
    _health: watch::Sender<StreamHealth>,
}

fn test_app() -> TestApp {
    let config = EngineConfig::default();
    let (dispatcher, worker) = NotificationDispatcher::new(&config.dispatcher, Arc::new(NullSink));
    let engine = Arc::new(PulseEngine::new(&config, dispatcher).unwrap());

    engine.ingest(&EditRecord::new("Foo", at(0), 0, 10));
    engine.ingest(&EditRecord::new("Foo", at(30), 10, 30));
    engine.ingest(&EditRecord::new("Foo", at(90), 30, 5030));
    engine.ingest(&EditRecord::new("Bar Baz", at(95), 100, 50));

    let (health_tx, health_rx) = watch::channel(StreamHealth::default());
    TestApp {
        router: create_router(AppState::new(engine, health_rx), true),
        _worker: worker,
        _health: health_tx,
    }
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn health_reports_stream_state() {
    let app = test_app();
    let (status, json) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["stream"]["state"], "connecting");
    assert_eq!(json["entities"], 2);
    assert_eq!(json["ingested"], 4);
}

#[tokio::test]
async fn buckets_by_granularity() {
    let app = test_app();
    let (status, json) = get(&app, "/api/v1/buckets/1m").await;
    assert_eq!(status, StatusCode::OK);

    let rows = json.as_array().unwrap();
    let summary: Vec<_> = rows
        .iter()
        .map(|b| (b["entity"].as_str().unwrap(), b["volume"].as_u64().unwrap()))
        .collect();
    assert_eq!(summary, vec![("Foo", 32), ("Foo", 5001), ("Bar Baz", 51)]);
    assert_eq!(rows[0]["granularity"], "1m");
    assert_eq!(rows[0]["startTime"], "1970-01-01T00:00:00Z");
    assert_eq!(rows[0]["endTime"], "1970-01-01T00:01:00Z");

    let (_, json) = get(&app, "/api/v1/buckets/5m?k=1").await;
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["entity"], "Foo");

    let (_, json) = get(&app, "/api/v1/buckets").await;
    assert_eq!(json, serde_json::json!(["1m", "5m", "1h", "6h"]));
}

#[tokio::test]
async fn bucket_errors() {
    let app = test_app();
    let (status, json) = get(&app, "/api/v1/buckets/fortnight").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "BAD_REQUEST");

    let (status, json) = get(&app, "/api/v1/buckets/1d").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    let (status, _) = get(&app, "/api/v1/buckets/1m?k=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn entity_lookup() {
    let app = test_app();
    let (status, json) = get(&app, "/api/v1/entities/Foo").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["editCount"], 3);
    assert_eq!(json["byteVolume"], 5030);
    assert_eq!(json["spiking"], true);

    let (_, json) = get(&app, "/api/v1/entities/Bar%20Baz").await;
    assert_eq!(json["title"], "Bar Baz");
    assert_eq!(json["byteVolume"], 50);
    assert_eq!(json["spiking"], false);

    let (status, json) = get(&app, "/api/v1/entities/Nobody").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["editCount"], 0);
}

#[tokio::test]
async fn spikes_and_leaderboards() {
    let app = test_app();
    let (_, json) = get(&app, "/api/v1/spikes/active").await;
    let spikes = json.as_array().unwrap();
    assert_eq!(spikes.len(), 1);
    assert_eq!(spikes[0]["entity"], "Foo");
    assert_eq!(spikes[0]["totalBytes"], 5030);
    assert_eq!(spikes[0]["startTime"], "1970-01-01T00:01:30Z");

    let (_, json) = get(&app, "/api/v1/leaderboard/edits?n=1").await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["entity"], "Foo");
    assert_eq!(json[0]["editCount"], 3);

    let (_, json) = get(&app, "/api/v1/leaderboard/bytes").await;
    assert_eq!(json.as_array().unwrap().len(), 2);

    let (status, _) = get(&app, "/api/v1/leaderboard/bytes?n=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = get(&app, "/api/v1/dispatcher").await;
    assert_eq!(json["capacity"], 1000);
    assert_eq!(json["enqueued"], 1);
    assert_eq!(json["pending"], 1);
}
