//! Flush loop tests for the ingestion service
//!
//! Timer-driven behaviour runs on a paused tokio clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain_events::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

type Service = IngestionService<MemoryEventStore, MemoryEventStore>;

fn service(config: IngestionConfig) -> (Arc<Service>, Arc<MemoryEventStore>) {
    let store = Arc::new(MemoryEventStore::new());
    let clock = SystemClock::shared();
    let sessions = Arc::new(SessionTracker::new(store.clone(), clock.clone()));
    (
        Arc::new(IngestionService::new(store.clone(), sessions, clock, config)),
        store,
    )
}

fn track(service: &Service, action: &str) {
    service
        .track(EventDraft::new(EventCategory::Workout, action), &RequestContext::default())
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loop_flushes_on_interval() {
    let (service, store) = service(
        IngestionConfig::default()
            .with_batch_size(100)
            .with_flush_interval(Duration::from_secs(5)),
    );
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(service.clone().run(rx));

    // Let the loop consume the immediate first tick
    tokio::time::sleep(Duration::from_millis(10)).await;
    track(&service, "started");
    assert!(store.is_empty().await);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(store.len().await, 1);
    assert_eq!(service.queued(), 0);

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_loop_flushes_early_at_batch_size() {
    let (service, store) = service(
        IngestionConfig::default()
            .with_batch_size(3)
            .with_flush_interval(Duration::from_secs(3600)),
    );
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(service.clone().run(rx));
    tokio::time::sleep(Duration::from_millis(10)).await;

    for action in ["a", "b", "c"] {
        track(&service, action);
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(store.len().await, 3);

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_queue() {
    let (service, store) = service(
        IngestionConfig::default()
            .with_batch_size(100)
            .with_flush_interval(Duration::from_secs(3600)),
    );
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(service.clone().run(rx));
    tokio::time::sleep(Duration::from_millis(10)).await;

    track(&service, "one");
    track(&service, "two");
    tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(store.len().await, 2);
    assert_eq!(service.queued(), 0);
}

/// Fails the first `failures` inserts, then delegates to memory.
struct FlakyStore {
    inner: MemoryEventStore,
    failures: AtomicUsize,
}

#[async_trait]
impl EventRepository for FlakyStore {
    async fn insert_batch(&self, events: &[Event]) -> EventResult<usize> {
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(EventError::Unavailable("connection refused".into()));
        }
        self.inner.insert_batch(events).await
    }

    async fn query(&self, query: &EventQuery) -> EventResult<Vec<Event>> {
        self.inner.query(query).await
    }

    async fn count(&self, query: &EventQuery) -> EventResult<u64> {
        self.inner.count(query).await
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> EventResult<u64> {
        self.inner.delete_before(cutoff).await
    }
}

#[tokio::test]
async fn test_failed_flush_is_retried_without_loss() {
    let store = Arc::new(FlakyStore {
        inner: MemoryEventStore::new(),
        failures: AtomicUsize::new(2),
    });
    let clock = SystemClock::shared();
    let sessions = Arc::new(SessionTracker::new(Arc::new(MemoryEventStore::new()), clock.clone()));
    let service = IngestionService::new(store.clone(), sessions, clock, IngestionConfig::default());

    for action in ["a", "b"] {
        service
            .track(EventDraft::new(EventCategory::Nutrition, action), &RequestContext::default())
            .unwrap();
    }

    assert!(service.flush().await.is_err());
    assert!(service.flush().await.is_err());
    assert_eq!(service.queued(), 2);

    assert_eq!(service.flush().await.unwrap(), FlushOutcome::Flushed(2));
    let stored: Vec<String> = store
        .inner
        .all_events()
        .await
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(stored, vec!["a", "b"]);
}

#[tokio::test]
async fn test_batch_failure_leaves_nothing_behind() {
    let store = Arc::new(FlakyStore {
        inner: MemoryEventStore::new(),
        failures: AtomicUsize::new(1),
    });
    let clock = SystemClock::shared();
    let sessions_store = Arc::new(MemoryEventStore::new());
    let sessions = Arc::new(SessionTracker::new(sessions_store.clone(), clock.clone()));
    let service = IngestionService::new(store.clone(), sessions, clock, IngestionConfig::default());

    let request = BatchRequest {
        events: vec![serde_json::json!({"category": "workout", "action": "started"})],
        device: None,
    };
    let ctx = RequestContext::default().with_session("s-1");

    let err = service.ingest_batch(request.clone(), &ctx).await.unwrap_err();
    assert!(err.is_transient());
    // Session bookkeeping only happens after a successful write
    assert!(sessions_store.get("s-1").await.unwrap().is_none());

    let receipt = service.ingest_batch(request, &ctx).await.unwrap();
    assert_eq!(receipt.accepted, 1);
    assert_eq!(store.inner.len().await, 1);
}
