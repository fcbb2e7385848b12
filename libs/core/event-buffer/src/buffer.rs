//! The client-side event queue.
//!
//! `track` only touches memory. A background loop started by [`spawn`] owns
//! the slow work: persisting the pending snapshot, flushing on a timer, and
//! flushing early once the queue reaches `batch_size`. Every flush path goes
//! through one guard, so a timer tick and a threshold wake never send the
//! same drafts twice.
//!
//! A flush drains the whole queue in requests of at most
//! [`BufferConfig::max_events_per_request`] drafts, each scoped to the
//! session its drafts were tracked in. The session id rotates once the
//! client has been idle for `session_timeout`.
//!
//! [`spawn`]: ClientEventBuffer::spawn

use chrono::Utc;
use domain_events::{DeviceInfo, EventCategory, EventDraft};
use observability::{FlushSide, IngestionMetrics};
use serde_json::Map;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::BufferConfig;
use crate::error::BufferError;
use crate::pending::PendingStore;
use crate::transport::{BatchTransport, OutgoingBatch};

/// Result of one flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// This many drafts were delivered and removed. Drafts the server
    /// refused during the same flush were dropped and logged.
    Sent(usize),
    /// Nothing was queued
    Empty,
    /// Another flush holds the guard; nothing was done
    InFlight,
    /// The buffer is offline; nothing was attempted
    Offline,
    /// Delivery failed; undelivered drafts stay queued and the buffer went offline
    Failed,
    /// The server refused every batch as malformed; this many drafts were dropped
    Rejected(usize),
}

/// A draft and the session it was tracked in
#[derive(Debug, Clone)]
struct Queued {
    session_id: Arc<str>,
    draft: EventDraft,
}

struct ClientSession {
    id: Arc<str>,
    last_activity: tokio::time::Instant,
}

impl ClientSession {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string().into(),
            last_activity: tokio::time::Instant::now(),
        }
    }
}

pub struct ClientEventBuffer {
    config: BufferConfig,
    transport: Arc<dyn BatchTransport>,
    pending: Arc<dyn PendingStore>,
    queue: Mutex<VecDeque<Queued>>,
    flush_guard: tokio::sync::Mutex<()>,
    online: AtomicBool,
    dirty: AtomicBool,
    wake: Notify,
    session: Mutex<ClientSession>,
    user_id: RwLock<Option<Uuid>>,
    device: DeviceInfo,
    last_screen: Mutex<Option<(String, Instant)>>,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ClientEventBuffer {
    pub fn new(
        config: BufferConfig,
        transport: Arc<dyn BatchTransport>,
        pending: Arc<dyn PendingStore>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            transport,
            pending,
            queue: Mutex::new(VecDeque::new()),
            flush_guard: tokio::sync::Mutex::new(()),
            online: AtomicBool::new(true),
            dirty: AtomicBool::new(false),
            wake: Notify::new(),
            session: Mutex::new(ClientSession::new()),
            user_id: RwLock::new(None),
            device: DeviceInfo::default(),
            last_screen: Mutex::new(None),
            shutdown,
            worker: Mutex::new(None),
        }
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    /// Build, reload persisted drafts and start the background loop
    pub async fn start(
        config: BufferConfig,
        transport: Arc<dyn BatchTransport>,
        pending: Arc<dyn PendingStore>,
        device: DeviceInfo,
    ) -> Arc<Self> {
        let buffer = Arc::new(Self::new(config, transport, pending).with_device(device));
        buffer.restore().await;
        buffer.spawn();
        buffer
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Client-generated id of the current session
    pub fn session_id(&self) -> String {
        self.lock_session().id.to_string()
    }

    /// Scope later batches to a user, or to nobody after logout
    pub fn set_user(&self, user_id: Option<Uuid>) {
        *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = user_id;
    }

    pub fn user_id(&self) -> Option<Uuid> {
        *self.user_id.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }

    pub fn queued(&self) -> usize {
        self.lock_queue().len()
    }

    /// Drafts currently queued, oldest first
    pub fn snapshot(&self) -> Vec<EventDraft> {
        self.lock_queue().iter().map(|q| q.draft.clone()).collect()
    }

    /// Queue a draft. Never blocks on I/O and never fails.
    pub fn track(&self, mut draft: EventDraft) {
        if draft.timestamp.is_none() {
            draft.timestamp = Some(Utc::now());
        }
        let session_id = self.touch_session();
        let depth = {
            let mut queue = self.lock_queue();
            queue.push_back(Queued { session_id, draft });
            queue.len()
        };
        IngestionMetrics::set_queue_depth(FlushSide::Client, depth);

        self.dirty.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Record a screen view. The previous screen gets a `time_spent` event
    /// carrying the seconds since its own view.
    pub fn track_screen_view(&self, screen: &str, metadata: Option<Map<String, serde_json::Value>>) {
        let now = Instant::now();
        let previous = self
            .last_screen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace((screen.to_string(), now));

        if let Some((previous_screen, viewed_at)) = previous {
            self.track(
                EventDraft::new(EventCategory::Navigation, "time_spent")
                    .with_label(previous_screen)
                    .with_value(now.duration_since(viewed_at).as_secs_f64()),
            );
        }

        self.track(
            EventDraft::new(EventCategory::Navigation, "screen_view")
                .with_label(screen)
                .with_metadata(metadata.unwrap_or_default()),
        );
    }

    /// Send the queue unless offline or another flush is running
    pub async fn flush(&self) -> FlushOutcome {
        if !self.is_online() {
            return FlushOutcome::Offline;
        }
        let Ok(_guard) = self.flush_guard.try_lock() else {
            tracing::debug!("Client flush already in flight");
            return FlushOutcome::InFlight;
        };
        self.flush_locked().await
    }

    /// Wait for any running flush, then flush. For controlled teardown.
    pub async fn flush_and_wait(&self) -> FlushOutcome {
        let _guard = self.flush_guard.lock().await;
        if !self.is_online() {
            return FlushOutcome::Offline;
        }
        self.flush_locked().await
    }

    /// Report connectivity. Coming back online retries the queue once, right away.
    pub async fn set_online(&self, online: bool) -> Option<FlushOutcome> {
        let was_online = self.online.swap(online, Ordering::AcqRel);
        match (was_online, online) {
            (false, true) => {
                tracing::info!(queued = self.queued(), "Back online, retrying pending events");
                Some(self.flush().await)
            }
            (true, false) => {
                tracing::info!(queued = self.queued(), "Went offline, holding events");
                None
            }
            _ => None,
        }
    }

    /// Load drafts persisted by an earlier run ahead of anything queued now.
    /// They are sent under the current session.
    pub async fn restore(&self) -> usize {
        let drafts = match self.pending.load().await {
            Ok(drafts) => drafts,
            Err(e) => {
                tracing::warn!(error = %e, "Could not load pending events; starting empty");
                return 0;
            }
        };

        let restored = drafts.len();
        let session_id = self.lock_session().id.clone();
        {
            let mut queue = self.lock_queue();
            for draft in drafts.into_iter().rev() {
                queue.push_front(Queued {
                    session_id: session_id.clone(),
                    draft,
                });
            }
        }
        if restored > 0 {
            tracing::info!(restored, "Restored pending events");
        }
        restored
    }

    /// Write the newest `pending_capacity` drafts to the pending store
    pub async fn persist(&self) {
        self.dirty.store(false, Ordering::Release);
        let snapshot: Vec<EventDraft> = {
            let queue = self.lock_queue();
            let skip = queue.len().saturating_sub(self.config.pending_capacity);
            queue.iter().skip(skip).map(|q| q.draft.clone()).collect()
        };

        if let Err(e) = self.pending.save(&snapshot).await {
            tracing::warn!(error = %e, pending = snapshot.len(), "Could not persist pending events");
        }
    }

    /// Start the background loop. Calling it again is a no-op.
    pub fn spawn(self: &Arc<Self>) {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if worker.is_some() {
            return;
        }
        let buffer = self.clone();
        let shutdown = self.shutdown.subscribe();
        *worker = Some(tokio::spawn(buffer.run(shutdown)));
    }

    /// Stop the loop after a final flush and persist
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        match worker {
            Some(handle) => {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Client buffer loop ended abnormally");
                }
            }
            None => self.drain().await,
        }
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        tracing::debug!(
            batch_size = self.config.batch_size,
            interval_ms = self.config.flush_interval.as_millis() as u64,
            "Client buffer loop started"
        );

        loop {
            let timer = tokio::select! {
                _ = ticker.tick() => true,
                _ = self.wake.notified() => false,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            if self.dirty.load(Ordering::Acquire) {
                self.persist().await;
            }
            if timer || self.queued() >= self.config.batch_size {
                self.flush().await;
            }
        }

        self.drain().await;
    }

    async fn drain(&self) {
        let outcome = self.flush_and_wait().await;
        self.persist().await;
        tracing::info!(?outcome, pending = self.queued(), "Client buffer stopped");
    }

    /// Send everything queued when the flush began. Drafts tracked meanwhile
    /// sit behind it and wait for the next flush.
    async fn flush_locked(&self) -> FlushOutcome {
        let mut remaining = self.queued();
        if remaining == 0 {
            return FlushOutcome::Empty;
        }

        let mut limit = self.config.max_events_per_request();
        let mut sent = 0;
        let mut dropped = 0;
        let mut failed = false;

        while remaining > 0 {
            let Some(batch) = self.next_batch(limit.min(remaining)) else {
                break;
            };
            let count = batch.events.len();
            let started = Instant::now();

            match self.transport.send(&batch).await {
                Ok(receipt) => {
                    IngestionMetrics::record_flush(FlushSide::Client, "ok", count, started.elapsed());
                    if receipt.rejected > 0 {
                        tracing::warn!(rejected = receipt.rejected, "Server dropped malformed events");
                    }
                    self.remove_front(count);
                    sent += count;
                    remaining -= count;
                }
                Err(BufferError::TooLarge { .. }) if count > 1 => {
                    IngestionMetrics::record_flush(FlushSide::Client, "split", count, started.elapsed());
                    limit = count / 2;
                    tracing::debug!(events = count, next = limit, "Server refused the batch size; splitting");
                }
                Err(e) if e.is_permanent() || matches!(e, BufferError::TooLarge { .. }) => {
                    IngestionMetrics::record_flush(FlushSide::Client, "rejected", count, started.elapsed());
                    tracing::warn!(error = %e, dropped = count, "Batch rejected; dropping it");
                    self.remove_front(count);
                    dropped += count;
                    remaining -= count;
                }
                Err(e) => {
                    IngestionMetrics::record_flush(FlushSide::Client, "error", count, started.elapsed());
                    self.online.store(false, Ordering::Release);
                    tracing::warn!(error = %e, queued = self.queued(), "Flush failed; going offline");
                    failed = true;
                    break;
                }
            }
        }

        if sent + dropped > 0 {
            IngestionMetrics::set_queue_depth(FlushSide::Client, self.queued());
            self.persist().await;
        }

        match (failed, sent, dropped) {
            (true, _, _) => FlushOutcome::Failed,
            (false, 0, 0) => FlushOutcome::Empty,
            (false, 0, dropped) => FlushOutcome::Rejected(dropped),
            (false, sent, _) => FlushOutcome::Sent(sent),
        }
    }

    /// Up to `max` drafts from the front of the queue that share a session
    fn next_batch(&self, max: usize) -> Option<OutgoingBatch> {
        let queue = self.lock_queue();
        let session_id = queue.front()?.session_id.clone();
        let events = queue
            .iter()
            .take(max)
            .take_while(|q| q.session_id == session_id)
            .map(|q| q.draft.clone())
            .collect();

        Some(OutgoingBatch {
            events,
            device: self.device.clone(),
            session_id: session_id.to_string(),
            user_id: self.user_id(),
        })
    }

    /// Drop the drafts that were just sent. Drafts tracked during the send
    /// sit behind them and stay queued.
    fn remove_front(&self, count: usize) {
        let mut queue = self.lock_queue();
        let count = count.min(queue.len());
        queue.drain(..count);
    }

    /// Current session id, rotated first when the client sat idle too long
    fn touch_session(&self) -> Arc<str> {
        let now = tokio::time::Instant::now();
        let mut session = self.lock_session();
        if now.duration_since(session.last_activity) >= self.config.session_timeout {
            let previous = std::mem::replace(&mut *session, ClientSession::new());
            tracing::info!(
                previous = %previous.id,
                session_id = %session.id,
                "Client idle past the session timeout; starting a new session"
            );
        }
        session.last_activity = now;
        session.id.clone()
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, ClientSession> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Queued>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BufferError, BufferResult};
    use crate::pending::MemoryPendingStore;
    use crate::transport::MockBatchTransport;
    use async_trait::async_trait;
    use domain_events::{BatchReceipt, MAX_BATCH_EVENTS};
    use std::time::Duration;

    /// Records every batch; fails while `failing` is set and can hold a send
    /// open until released.
    #[derive(Default)]
    struct RecordingTransport {
        batches: Mutex<Vec<OutgoingBatch>>,
        failing: AtomicBool,
        max_events: Option<usize>,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    }

    impl RecordingTransport {
        fn gated() -> (Arc<Self>, Arc<Notify>, Arc<Notify>) {
            let entered = Arc::new(Notify::new());
            let release = Arc::new(Notify::new());
            let transport = Arc::new(Self {
                gate: Some((entered.clone(), release.clone())),
                ..Default::default()
            });
            (transport, entered, release)
        }

        fn limited(max_events: usize) -> Arc<Self> {
            Arc::new(Self {
                max_events: Some(max_events),
                ..Default::default()
            })
        }

        fn batches(&self) -> Vec<OutgoingBatch> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchTransport for RecordingTransport {
        async fn send(&self, batch: &OutgoingBatch) -> BufferResult<BatchReceipt> {
            if let Some((entered, release)) = &self.gate {
                entered.notify_one();
                release.notified().await;
            }
            if self.max_events.is_some_and(|max| batch.events.len() > max) {
                return Err(BufferError::TooLarge {
                    events: batch.events.len(),
                });
            }
            self.batches.lock().unwrap().push(batch.clone());
            if self.failing.load(Ordering::SeqCst) {
                return Err(BufferError::Transport("connection refused".into()));
            }
            Ok(BatchReceipt {
                accepted: batch.events.len(),
                rejected: 0,
            })
        }
    }

    fn draft(action: &str) -> EventDraft {
        EventDraft::new(EventCategory::FeatureUsage, action)
    }

    fn buffer_with(
        transport: Arc<dyn BatchTransport>,
        pending: Arc<MemoryPendingStore>,
        config: BufferConfig,
    ) -> Arc<ClientEventBuffer> {
        Arc::new(ClientEventBuffer::new(config, transport, pending))
    }

    #[tokio::test]
    async fn test_flush_sends_queue_and_clears_both_copies() {
        let transport = Arc::new(RecordingTransport::default());
        let pending = Arc::new(MemoryPendingStore::new());
        let buffer = buffer_with(transport.clone(), pending.clone(), BufferConfig::default());
        let user = Uuid::new_v4();
        buffer.set_user(Some(user));

        buffer.track(draft("a"));
        buffer.track(draft("b"));
        buffer.persist().await;
        assert_eq!(pending.snapshot().len(), 2);

        assert_eq!(buffer.flush().await, FlushOutcome::Sent(2));

        let batches = transport.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].session_id, buffer.session_id());
        assert_eq!(batches[0].user_id, Some(user));
        assert!(batches[0].events.iter().all(|d| d.timestamp.is_some()));
        assert_eq!(buffer.queued(), 0);
        assert!(pending.snapshot().is_empty());
        assert_eq!(buffer.flush().await, FlushOutcome::Empty);
    }

    #[tokio::test]
    async fn test_failure_goes_offline_until_online_again() {
        let transport = Arc::new(RecordingTransport::default());
        transport.failing.store(true, Ordering::SeqCst);
        let buffer = buffer_with(
            transport.clone(),
            Arc::new(MemoryPendingStore::new()),
            BufferConfig::default(),
        );

        buffer.track(draft("a"));
        buffer.track(draft("b"));
        assert_eq!(buffer.flush().await, FlushOutcome::Failed);
        assert!(!buffer.is_online());
        assert_eq!(buffer.queued(), 2);

        // No attempt at all while offline
        buffer.track(draft("c"));
        assert_eq!(buffer.flush().await, FlushOutcome::Offline);
        assert_eq!(transport.batches().len(), 1);

        transport.failing.store(false, Ordering::SeqCst);
        assert_eq!(buffer.set_online(true).await, Some(FlushOutcome::Sent(3)));
        assert_eq!(transport.batches().len(), 2);
        assert_eq!(buffer.queued(), 0);

        // Already online: no extra flush
        assert_eq!(buffer.set_online(true).await, None);
        assert_eq!(transport.batches().len(), 2);
    }

    #[tokio::test]
    async fn test_persisted_queue_keeps_newest_hundred() {
        let pending = Arc::new(MemoryPendingStore::new());
        let buffer = buffer_with(
            Arc::new(RecordingTransport::default()),
            pending.clone(),
            BufferConfig::default().with_batch_size(1000),
        );

        for n in 0..150 {
            buffer.track(draft(&format!("e{n}")));
        }
        buffer.persist().await;

        let stored = pending.snapshot();
        assert_eq!(stored.len(), 100);
        assert_eq!(stored.first().unwrap().action, "e50");
        assert_eq!(stored.last().unwrap().action, "e149");
        assert_eq!(buffer.queued(), 150);
    }

    #[tokio::test]
    async fn test_restore_puts_saved_drafts_first() {
        let pending = Arc::new(MemoryPendingStore::with_drafts(vec![draft("old-1"), draft("old-2")]));
        let transport = Arc::new(RecordingTransport::default());
        let buffer = buffer_with(transport.clone(), pending, BufferConfig::default());

        buffer.track(draft("new"));
        assert_eq!(buffer.restore().await, 2);
        buffer.flush().await;

        let actions: Vec<String> = transport.batches()[0]
            .events
            .iter()
            .map(|d| d.action.clone())
            .collect();
        assert_eq!(actions, vec!["old-1", "old-2", "new"]);
    }

    #[tokio::test]
    async fn test_concurrent_flush_is_a_noop_and_keeps_late_drafts() {
        let (transport, entered, release) = RecordingTransport::gated();
        let buffer = buffer_with(
            transport.clone(),
            Arc::new(MemoryPendingStore::new()),
            BufferConfig::default(),
        );
        buffer.track(draft("a"));

        let first = tokio::spawn({
            let buffer = buffer.clone();
            async move { buffer.flush().await }
        });
        entered.notified().await;

        assert_eq!(buffer.flush().await, FlushOutcome::InFlight);
        buffer.track(draft("late"));

        release.notify_one();
        assert_eq!(first.await.unwrap(), FlushOutcome::Sent(1));
        assert_eq!(buffer.queued(), 1);
        assert_eq!(buffer.snapshot()[0].action, "late");
        assert_eq!(transport.batches()[0].events.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_batch_is_dropped() {
        let mut transport = MockBatchTransport::new();
        transport.expect_send().times(1).returning(|_| {
            Err(BufferError::Rejected {
                status: 400,
                body: "all events malformed".into(),
            })
        });
        let buffer = buffer_with(
            Arc::new(transport),
            Arc::new(MemoryPendingStore::new()),
            BufferConfig::default(),
        );

        buffer.track(draft("a"));
        assert_eq!(buffer.flush().await, FlushOutcome::Rejected(1));
        assert_eq!(buffer.queued(), 0);
        assert!(buffer.is_online());
    }

    #[tokio::test]
    async fn test_screen_view_emits_time_spent_for_previous_screen() {
        let buffer = buffer_with(
            Arc::new(RecordingTransport::default()),
            Arc::new(MemoryPendingStore::new()),
            BufferConfig::default(),
        );

        buffer.track_screen_view("home", None);
        std::thread::sleep(Duration::from_millis(20));
        buffer.track_screen_view("workout", None);

        let queued = buffer.snapshot();
        assert_eq!(queued.len(), 3);
        assert_eq!(queued[0].action, "screen_view");
        assert_eq!(queued[0].label.as_deref(), Some("home"));
        assert_eq!(queued[1].action, "time_spent");
        assert_eq!(queued[1].label.as_deref(), Some("home"));
        assert!(queued[1].value.unwrap() >= 0.02);
        assert_eq!(queued[2].label.as_deref(), Some("workout"));
        assert!(queued.iter().all(|d| d.category == EventCategory::Navigation));
    }

    #[tokio::test]
    async fn test_offline_backlog_is_sent_in_request_sized_chunks() {
        let transport = Arc::new(RecordingTransport::default());
        let buffer = buffer_with(
            transport.clone(),
            Arc::new(MemoryPendingStore::new()),
            BufferConfig::default(),
        );
        buffer.set_online(false).await;

        for n in 0..600 {
            buffer.track(draft(&format!("e{n}")));
        }
        assert_eq!(buffer.flush().await, FlushOutcome::Offline);

        assert_eq!(buffer.set_online(true).await, Some(FlushOutcome::Sent(600)));
        let batches = transport.batches();
        assert_eq!(batches.len(), 30);
        assert!(batches.iter().all(|b| b.events.len() == 20));
        let actions: Vec<String> = batches
            .iter()
            .flat_map(|b| b.events.iter().map(|d| d.action.clone()))
            .collect();
        let expected: Vec<String> = (0..600).map(|n| format!("e{n}")).collect();
        assert_eq!(actions, expected);
        assert_eq!(buffer.queued(), 0);
    }

    #[tokio::test]
    async fn test_large_batch_size_never_exceeds_the_server_limit() {
        let transport = Arc::new(RecordingTransport::default());
        let buffer = buffer_with(
            transport.clone(),
            Arc::new(MemoryPendingStore::new()),
            BufferConfig::default().with_batch_size(2000),
        );

        for n in 0..1200 {
            buffer.track(draft(&format!("e{n}")));
        }
        assert_eq!(buffer.flush().await, FlushOutcome::Sent(1200));

        let sizes: Vec<usize> = transport.batches().iter().map(|b| b.events.len()).collect();
        assert_eq!(sizes, vec![MAX_BATCH_EVENTS, MAX_BATCH_EVENTS, 200]);
    }

    #[tokio::test]
    async fn test_too_large_batch_is_split_until_accepted() {
        let transport = RecordingTransport::limited(100);
        let buffer = buffer_with(
            transport.clone(),
            Arc::new(MemoryPendingStore::new()),
            BufferConfig::default().with_batch_size(1000),
        );

        for n in 0..600 {
            buffer.track(draft(&format!("e{n}")));
        }
        assert_eq!(buffer.flush().await, FlushOutcome::Sent(600));

        let batches = transport.batches();
        assert!(batches.iter().all(|b| b.events.len() <= 100));
        assert_eq!(batches.iter().map(|b| b.events.len()).sum::<usize>(), 600);
        assert_eq!(batches[0].events[0].action, "e0");
        assert_eq!(buffer.queued(), 0);
        assert!(buffer.is_online());
    }

    #[tokio::test]
    async fn test_single_draft_too_large_is_dropped() {
        let transport = RecordingTransport::limited(0);
        let buffer = buffer_with(
            transport.clone(),
            Arc::new(MemoryPendingStore::new()),
            BufferConfig::default(),
        );

        buffer.track(draft("a"));
        buffer.track(draft("b"));
        assert_eq!(buffer.flush().await, FlushOutcome::Rejected(2));
        assert_eq!(buffer.queued(), 0);
        assert!(transport.batches().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_rotates_after_inactivity() {
        let transport = Arc::new(RecordingTransport::default());
        let buffer = buffer_with(
            transport.clone(),
            Arc::new(MemoryPendingStore::new()),
            BufferConfig::default(),
        );

        buffer.track(draft("before"));
        let first_session = buffer.session_id();
        tokio::time::advance(Duration::from_secs(29 * 60)).await;
        buffer.track(draft("still-active"));
        assert_eq!(buffer.session_id(), first_session);

        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        buffer.track(draft("after"));
        let second_session = buffer.session_id();
        assert_ne!(second_session, first_session);

        assert_eq!(buffer.flush().await, FlushOutcome::Sent(3));
        let batches = transport.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].session_id, first_session);
        assert_eq!(batches[0].events.len(), 2);
        assert_eq!(batches[1].session_id, second_session);
        assert_eq!(batches[1].events[0].action, "after");
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_flushes_on_threshold_timer_and_shutdown() {
        let transport = Arc::new(RecordingTransport::default());
        let pending = Arc::new(MemoryPendingStore::new());
        let config = BufferConfig::default()
            .with_batch_size(3)
            .with_flush_interval(Duration::from_secs(5));
        let buffer = buffer_with(transport.clone(), pending.clone(), config);
        buffer.spawn();

        for n in 0..3 {
            buffer.track(draft(&format!("t{n}")));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.batches().len(), 1);
        assert_eq!(transport.batches()[0].events.len(), 3);

        buffer.track(draft("timer"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.batches().len(), 1);
        assert_eq!(pending.snapshot().len(), 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.batches().len(), 2);

        buffer.track(draft("last"));
        buffer.shutdown().await;
        assert_eq!(transport.batches().len(), 3);
        assert_eq!(transport.batches()[2].events[0].action, "last");
        assert!(pending.snapshot().is_empty());
    }
}
