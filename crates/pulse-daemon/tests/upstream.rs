//! Notification sink and live stream against local HTTP servers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{body::Body, http::StatusCode, routing::get, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use futures_util::stream;
use pulse_daemon::config::StreamConfig;
use pulse_daemon::ingest::{ConnectionState, LiveStream};
use pulse_daemon::HttpNotificationSink;
use pulse_engine::{
    DeliveryError, EngineConfig, NotificationDispatcher, NotificationSink, PulseEngine,
};
use pulse_types::{Normalizer, SpikePayload};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn payload(active: bool) -> SpikePayload {
    let t: DateTime<Utc> = DateTime::from_timestamp(90, 0).unwrap();
    SpikePayload {
        title: "Foo".into(),
        start_time: t,
        last_edit_time: t,
        total_edits: 3,
        total_bytes: 5030,
        is_active: active,
    }
}

#[tokio::test]
async fn sink_posts_wire_payload() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let router = Router::new().route(
        "/edits/spikes",
        post(move |Json(body): Json<Value>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(body);
                StatusCode::CREATED
            }
        }),
    );
    let base = serve(router).await;

    let sink = HttpNotificationSink::new(&base, Duration::from_secs(5)).unwrap();
    sink.deliver(&payload(true)).await.unwrap();

    let body = rx.recv().await.unwrap();
    assert_eq!(body["title"], "Foo");
    assert_eq!(body["startTime"], "1970-01-01T00:01:30Z");
    assert_eq!(body["lastEditTime"], "1970-01-01T00:01:30Z");
    assert_eq!(body["totalEdits"], 3);
    assert_eq!(body["totalBytes"], 5030);
    assert_eq!(body["isActive"], true);
}

#[tokio::test]
async fn sink_reports_rejection() {
    let router = Router::new().route(
        "/edits/spikes",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database down") }),
    );
    let base = serve(router).await;

    let sink = HttpNotificationSink::new(&base, Duration::from_secs(5)).unwrap();
    let err = sink.deliver(&payload(false)).await.unwrap_err();
    match err {
        DeliveryError::Rejected { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "database down");
        }
        other => panic!("unexpected error: {other}"),
    }
}

struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _payload: &SpikePayload) -> Result<(), DeliveryError> {
        Ok(())
    }
}

#[tokio::test]
async fn live_stream_ingests_and_reconnects() {
    const BODY: &str = concat!(
        ":ok\n\n",
        "event: message\n",
        "id: [{\"topic\":\"recentchange\"}]\n",
        "data: {\"meta\":{\"domain\":\"en.wikipedia.org\"},\"type\":\"edit\",\"title\":\"Foo\",\"id\":1,",
        "\"timestamp\":1700000000,\"length\":{\"old\":10,\"new\":30},\"user\":\"A\",\"bot\":false,\"minor\":false}\n\n",
        "data: {\"meta\":{\"domain\":\"en.wikipedia.org\"},\"type\":\"edit\",\"title\":\"User:A\",\"timestamp\":1700000000}\n\n",
        "data: not json\n\n",
    );
    let router = Router::new().route("/stream", get(|| async { BODY }));
    let base = serve(router).await;

    let config = EngineConfig::default();
    let (dispatcher, _worker) = NotificationDispatcher::new(&config.dispatcher, Arc::new(NullSink));
    let engine = Arc::new(PulseEngine::new(&config, dispatcher).unwrap());

    let live = LiveStream::new(
        reqwest::Client::new(),
        format!("{base}/stream"),
        StreamConfig {
            quiet_period_ms: 500,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
        },
        Normalizer::default(),
        engine.clone(),
    );
    let mut health = live.health();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(live.run(shutdown_rx));

    // The server closes after each body, so every reconnect replays it.
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            health.changed().await.unwrap();
            if health.borrow().attempts >= 2 && engine.edit_count("Foo") >= 2 {
                break;
            }
        }
    })
    .await
    .unwrap();

    let h = health.borrow().clone();
    assert!(h.ingested >= 2);
    assert!(h.skipped >= 2);
    assert_eq!(engine.edit_count("User:A"), 0);
    assert_eq!(engine.byte_volume("Foo") % 20, 0);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
    assert_eq!(health.borrow().state, ConnectionState::Stopped);
}

#[tokio::test]
async fn silent_stream_is_torn_down_and_reopened() {
    // Headers go out, then the body never yields a byte.
    let router = Router::new().route(
        "/stream",
        get(|| async { Body::from_stream(stream::pending::<Result<Vec<u8>, std::io::Error>>()) }),
    );
    let base = serve(router).await;

    let config = EngineConfig::default();
    let (dispatcher, _worker) = NotificationDispatcher::new(&config.dispatcher, Arc::new(NullSink));
    let engine = Arc::new(PulseEngine::new(&config, dispatcher).unwrap());

    let live = LiveStream::new(
        reqwest::Client::new(),
        format!("{base}/stream"),
        StreamConfig {
            quiet_period_ms: 100,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
        },
        Normalizer::default(),
        engine,
    );
    let mut health = live.health();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(live.run(shutdown_rx));

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            health.changed().await.unwrap();
            let h = health.borrow().clone();
            if h.attempts >= 3 && h.state == ConnectionState::Backoff {
                assert_eq!(h.last_error.as_deref(), Some("no data for 100ms"));
                break;
            }
        }
    })
    .await
    .unwrap();

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
    assert_eq!(health.borrow().state, ConnectionState::Stopped);
}
