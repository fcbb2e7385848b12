//! HttpTransport against a local axum server standing in for ingestion

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use domain_events::{IngestionConfig, IngestionService, MemoryEventStore, SessionTracker, SystemClock, events_router};
use event_buffer::*;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use test_utils::TestDataBuilder;

#[derive(Default)]
struct Ingest {
    status: AtomicU16,
    seen: Mutex<Vec<(HeaderMap, Value)>>,
}

async fn ingest_batch(
    State(ingest): State<Arc<Ingest>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let accepted = body["events"].as_array().map_or(0, Vec::len);
    ingest.seen.lock().unwrap().push((headers, body));

    let status = StatusCode::from_u16(ingest.status.load(Ordering::SeqCst)).unwrap();
    if status.is_success() {
        (status, Json(json!({"accepted": accepted, "rejected": 0})))
    } else {
        (status, Json(json!({"error": "nope"})))
    }
}

async fn serve(ingest: Arc<Ingest>) -> String {
    let app = Router::new()
        .route(BATCH_PATH, post(ingest_batch))
        .with_state(ingest);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{address}")
}

fn batch(data: &TestDataBuilder) -> OutgoingBatch {
    OutgoingBatch {
        events: vec![
            EventDraft::new(EventCategory::Workout, "completed").with_value(42.0),
            EventDraft::new(EventCategory::Navigation, "screen_view").with_label("home"),
        ],
        device: DeviceInfo {
            platform: Some("ios".into()),
            ..Default::default()
        },
        session_id: data.session_id("client"),
        user_id: Some(data.user_id()),
    }
}

#[tokio::test]
async fn test_successful_batch_carries_scope_headers() {
    let ingest = Arc::new(Ingest::default());
    ingest.status.store(200, Ordering::SeqCst);
    let endpoint = serve(ingest.clone()).await;
    let data = TestDataBuilder::from_test_name("http_success");

    let transport = HttpTransport::new(&BufferConfig::new(endpoint)).unwrap();
    let receipt = transport.send(&batch(&data)).await.unwrap();

    assert_eq!(receipt.accepted, 2);
    let seen = ingest.seen.lock().unwrap();
    let (headers, body) = &seen[0];
    assert_eq!(headers["x-session-id"], data.session_id("client").as_str());
    assert_eq!(headers["x-user-id"], data.user_id().to_string().as_str());
    assert_eq!(headers["x-platform"], "ios");
    assert_eq!(body["events"][0]["category"], "workout");
    assert_eq!(body["device"]["platform"], "ios");
}

#[tokio::test]
async fn test_client_error_is_a_rejection() {
    let ingest = Arc::new(Ingest::default());
    ingest.status.store(400, Ordering::SeqCst);
    let endpoint = serve(ingest).await;
    let data = TestDataBuilder::from_test_name("http_rejected");

    let transport = HttpTransport::new(&BufferConfig::new(endpoint)).unwrap();
    let err = transport.send(&batch(&data)).await.unwrap_err();

    assert!(matches!(err, BufferError::Rejected { status: 400, .. }));
}

#[tokio::test]
async fn test_payload_too_large_asks_for_a_split() {
    let ingest = Arc::new(Ingest::default());
    ingest.status.store(413, Ordering::SeqCst);
    let endpoint = serve(ingest).await;
    let data = TestDataBuilder::from_test_name("http_too_large");

    let transport = HttpTransport::new(&BufferConfig::new(endpoint)).unwrap();
    let err = transport.send(&batch(&data)).await.unwrap_err();

    assert!(matches!(err, BufferError::TooLarge { events: 2 }));
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn test_unavailable_and_unreachable_are_transient() {
    let ingest = Arc::new(Ingest::default());
    ingest.status.store(503, Ordering::SeqCst);
    let endpoint = serve(ingest).await;
    let data = TestDataBuilder::from_test_name("http_unavailable");

    let transport = HttpTransport::new(&BufferConfig::new(endpoint)).unwrap();
    let err = transport.send(&batch(&data)).await.unwrap_err();
    assert!(matches!(err, BufferError::Transport(_)));

    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let closed = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let transport = HttpTransport::new(&BufferConfig::new(closed)).unwrap();
    let err = transport.send(&batch(&data)).await.unwrap_err();
    assert!(!err.is_permanent());
}

#[tokio::test]
async fn test_buffer_end_to_end_over_http() {
    let ingest = Arc::new(Ingest::default());
    ingest.status.store(200, Ordering::SeqCst);
    let endpoint = serve(ingest.clone()).await;

    let config = BufferConfig::new(endpoint);
    let transport = Arc::new(HttpTransport::new(&config).unwrap());
    let buffer = ClientEventBuffer::start(
        config,
        transport,
        Arc::new(MemoryPendingStore::new()),
        DeviceInfo::default(),
    )
    .await;

    buffer.track(EventDraft::new(EventCategory::FeatureUsage, "used").with_label("timer"));
    buffer.shutdown().await;

    let seen = ingest.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1["events"][0]["label"], "timer");
    assert_eq!(seen[0].0["x-session-id"], buffer.session_id().as_str());
}

#[tokio::test]
async fn test_offline_backlog_over_the_server_limit_reaches_the_store() {
    let store = Arc::new(MemoryEventStore::new());
    let clock = SystemClock::shared();
    let sessions = Arc::new(SessionTracker::new(store.clone(), clock.clone()));
    let service = Arc::new(IngestionService::new(
        store.clone(),
        sessions,
        clock,
        IngestionConfig::default(),
    ));
    let app = Router::new().nest("/api/events", events_router(service));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = BufferConfig::new(format!("http://{address}")).with_batch_size(1000);
    let transport = Arc::new(HttpTransport::new(&config).unwrap());
    let buffer = ClientEventBuffer::new(config, transport, Arc::new(MemoryPendingStore::new()));

    buffer.set_online(false).await;
    for n in 0..600 {
        buffer.track(EventDraft::new(EventCategory::Workout, format!("e{n}")));
    }

    assert_eq!(buffer.set_online(true).await, Some(FlushOutcome::Sent(600)));
    assert_eq!(buffer.queued(), 0);
    assert_eq!(store.len().await, 600);
}
