//! Batched event ingestion.
//!
//! Two paths feed the store:
//!
//! - [`IngestionService::ingest_batch`] writes a client batch synchronously so
//!   the client learns whether to keep or drop it.
//! - [`IngestionService::track`] queues server-side events; the [`run`] loop
//!   flushes the queue on a timer or when it reaches `batch_size`.
//!
//! A transient store failure puts the batch back at the front of the queue,
//! so delivery is at-least-once and a retried batch may be stored twice.
//! When the store refuses a batch outright, the events are written one at a
//! time and only the refused ones are dropped.
//!
//! [`run`]: IngestionService::run

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use observability::{FlushSide, IngestionMetrics};
use serde_json::Value;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::clock::SharedClock;
use crate::config::IngestionConfig;
use crate::context::RequestContext;
use crate::error::{EventError, EventResult};
use crate::models::{
    BatchReceipt, BatchRequest, ClientContext, DeviceInfo, Event, EventDraft, MAX_BATCH_EVENTS,
    NewSession,
};
use crate::repository::{EventRepository, SessionRepository};
use crate::sessions::SessionTracker;

/// Result of one flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// This many events were written
    Flushed(usize),
    /// Nothing was queued
    Empty,
    /// Another flush holds the guard; nothing was done
    InFlight,
}

pub struct IngestionService<E: EventRepository, S: SessionRepository> {
    events: Arc<E>,
    sessions: Arc<SessionTracker<S>>,
    clock: SharedClock,
    config: IngestionConfig,
    queue: Mutex<VecDeque<Event>>,
    flush_guard: tokio::sync::Mutex<()>,
    wake: Notify,
}

impl<E, S> IngestionService<E, S>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    pub fn new(
        events: Arc<E>,
        sessions: Arc<SessionTracker<S>>,
        clock: SharedClock,
        config: IngestionConfig,
    ) -> Self {
        Self {
            events,
            sessions,
            clock,
            config,
            queue: Mutex::new(VecDeque::new()),
            flush_guard: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
        }
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionTracker<S>> {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<E> {
        &self.events
    }

    /// Validate and store a client batch.
    ///
    /// Malformed drafts are dropped and counted; the rest are written in one
    /// bounded insert. A transient store failure fails the whole batch so the
    /// client keeps it for retry. Batches over [`MAX_BATCH_EVENTS`] are
    /// refused before anything is parsed.
    #[instrument(skip(self, request, ctx), fields(
        batch = request.events.len(),
        session_id = ctx.session_id.as_deref(),
        user_id = ctx.user_id.map(|u| u.to_string()),
    ))]
    pub async fn ingest_batch(
        &self,
        request: BatchRequest,
        ctx: &RequestContext,
    ) -> EventResult<BatchReceipt> {
        let BatchRequest { events: raw, device } = request;
        if raw.is_empty() {
            return Ok(BatchReceipt::default());
        }

        if raw.len() > MAX_BATCH_EVENTS {
            return Err(EventError::BatchTooLarge {
                events: raw.len(),
                max: MAX_BATCH_EVENTS,
            });
        }

        let total = raw.len();
        let mut accepted = Vec::with_capacity(total);
        for (index, value) in raw.into_iter().enumerate() {
            match parse_draft(value) {
                Ok(draft) => accepted.push(self.build_event(draft, ctx, device.as_ref())),
                Err(reason) => tracing::warn!(index, %reason, "Dropping malformed event draft"),
            }
        }

        let malformed = total - accepted.len();
        IngestionMetrics::record_rejected(malformed);

        if accepted.is_empty() {
            return Err(EventError::Validation(format!(
                "all {total} events in the batch were malformed"
            )));
        }

        let started = Instant::now();
        let written = match self.write_isolating(&accepted).await {
            Ok(stored) => {
                IngestionMetrics::record_flush(FlushSide::Server, "ok", stored.len(), started.elapsed());
                stored.len()
            }
            Err(e) => {
                IngestionMetrics::record_flush(FlushSide::Server, outcome_label(&e), accepted.len(), started.elapsed());
                tracing::warn!(error = %e, events = accepted.len(), "Batch write failed");
                return Err(e);
            }
        };

        let refused = accepted.len() - written;
        IngestionMetrics::record_rejected(refused);
        if written == 0 {
            return Err(EventError::Unstorable(format!(
                "the store refused all {} events in the batch",
                accepted.len()
            )));
        }
        IngestionMetrics::record_accepted("batch", written);
        let rejected = malformed + refused;

        if let Some(session_id) = &ctx.session_id {
            self.touch_session(session_id, ctx, device.unwrap_or_default(), written)
                .await;
        }

        Ok(BatchReceipt {
            accepted: written,
            rejected,
        })
    }

    /// Queue a single server-side event for the next flush.
    #[instrument(skip(self, draft, ctx), fields(category = %draft.category, action = %draft.action))]
    pub fn track(&self, draft: EventDraft, ctx: &RequestContext) -> EventResult<Event> {
        draft.validate()?;
        let event = self.build_event(draft, ctx, None);

        let depth = {
            let mut queue = self.lock_queue();
            queue.push_back(event.clone());
            queue.len()
        };
        IngestionMetrics::set_queue_depth(FlushSide::Server, depth);

        if depth >= self.config.batch_size {
            self.wake.notify_one();
        }
        Ok(event)
    }

    /// Events waiting for the next flush
    pub fn queued(&self) -> usize {
        self.lock_queue().len()
    }

    /// Flush the queue unless another flush is running.
    pub async fn flush(&self) -> EventResult<FlushOutcome> {
        let Ok(_guard) = self.flush_guard.try_lock() else {
            tracing::debug!("Flush already in flight");
            return Ok(FlushOutcome::InFlight);
        };
        self.flush_locked().await
    }

    /// Wait for any running flush, then flush whatever is queued.
    pub async fn flush_and_wait(&self) -> EventResult<FlushOutcome> {
        let _guard = self.flush_guard.lock().await;
        self.flush_locked().await
    }

    /// Periodic flush loop. Returns after a final flush once `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            batch_size = self.config.batch_size,
            interval_ms = self.config.flush_interval.as_millis() as u64,
            "Ingestion flush loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.flush().await {
                tracing::warn!(error = %e, queued = self.queued(), "Periodic flush failed; batch requeued");
            }
        }

        match self.flush_and_wait().await {
            Ok(outcome) => tracing::info!(?outcome, "Ingestion queue drained on shutdown"),
            Err(e) => tracing::error!(error = %e, lost = self.queued(), "Final flush failed"),
        }
    }

    async fn flush_locked(&self) -> EventResult<FlushOutcome> {
        let batch: Vec<Event> = self.lock_queue().drain(..).collect();
        if batch.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let started = Instant::now();
        match self.write_isolating(&batch).await {
            Ok(stored) => {
                let written = stored.len();
                IngestionMetrics::record_flush(FlushSide::Server, "ok", written, started.elapsed());
                IngestionMetrics::record_accepted("queue", written);
                IngestionMetrics::record_rejected(batch.len() - written);
                IngestionMetrics::set_queue_depth(FlushSide::Server, self.queued());
                self.record_session_activity(&stored).await;
                Ok(FlushOutcome::Flushed(written))
            }
            Err(e) => {
                IngestionMetrics::record_flush(FlushSide::Server, outcome_label(&e), batch.len(), started.elapsed());
                let depth = {
                    let mut queue = self.lock_queue();
                    for event in batch.into_iter().rev() {
                        queue.push_front(event);
                    }
                    queue.len()
                };
                IngestionMetrics::set_queue_depth(FlushSide::Server, depth);
                Err(e)
            }
        }
    }

    async fn write(&self, events: &[Event]) -> EventResult<usize> {
        match tokio::time::timeout(self.config.write_timeout, self.events.insert_batch(events)).await {
            Ok(Ok(written)) => Ok(written),
            Ok(Err(e @ (EventError::Unavailable(_) | EventError::Timeout(_)))) => Err(e),
            Ok(Err(e)) if e.is_transient() => Err(EventError::Unavailable(e.to_string())),
            Ok(Err(e)) => Err(EventError::Unstorable(e.to_string())),
            Err(_) => Err(EventError::Timeout(self.config.write_timeout)),
        }
    }

    /// Write `events` in one insert. If the store refuses that insert, write
    /// them one by one and skip the refused ones. Transient failures still
    /// fail the call. Returns the events that were stored.
    async fn write_isolating<'a>(&self, events: &'a [Event]) -> EventResult<Vec<&'a Event>> {
        let err = match self.write(events).await {
            Ok(_) => return Ok(events.iter().collect()),
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => e,
        };

        tracing::warn!(error = %err, events = events.len(), "Store refused the batch; writing events one at a time");
        let mut stored = Vec::with_capacity(events.len());
        for event in events {
            match self.write(std::slice::from_ref(event)).await {
                Ok(_) => stored.push(event),
                Err(e) if e.is_transient() => return Err(e),
                Err(e) => tracing::warn!(event_id = %event.id, error = %e, "Dropping event the store refused"),
            }
        }
        Ok(stored)
    }

    async fn touch_session(&self, session_id: &str, ctx: &RequestContext, device: DeviceInfo, events: usize) {
        let new = NewSession {
            session_id: session_id.to_string(),
            user_id: ctx.user_id,
            device,
            user_agent: ctx.client.user_agent.clone(),
            ip_address: ctx.client.ip.clone(),
        };

        if let Err(e) = self.sessions.create_session(new).await {
            tracing::warn!(session_id, error = %e, "Failed to create session");
            return;
        }
        if let Err(e) = self.sessions.record_events(session_id, events).await {
            tracing::warn!(session_id, error = %e, "Failed to record session activity");
        }
    }

    async fn record_session_activity(&self, batch: &[&Event]) {
        let mut per_session: HashMap<&str, usize> = HashMap::new();
        for session_id in batch.iter().filter_map(|e| e.session_id.as_deref()) {
            *per_session.entry(session_id).or_default() += 1;
        }

        for (session_id, count) in per_session {
            if let Err(e) = self.sessions.record_events(session_id, count).await {
                tracing::warn!(session_id, error = %e, "Failed to record session activity");
            }
        }
    }

    fn build_event(&self, draft: EventDraft, ctx: &RequestContext, device: Option<&DeviceInfo>) -> Event {
        let event_type = draft.resolved_event_type();
        Event {
            id: Uuid::now_v7(),
            user_id: ctx.user_id,
            session_id: ctx.session_id.clone(),
            event_type,
            category: draft.category,
            action: draft.action,
            label: draft.label,
            value: draft.value,
            metadata: draft.metadata,
            context: ClientContext {
                platform: ctx
                    .platform
                    .clone()
                    .or_else(|| device.and_then(|d| d.platform.clone())),
                user_agent: ctx.client.user_agent.clone(),
                ip_address: ctx.client.ip.clone(),
                app_version: device.and_then(|d| d.app_version.clone()),
            },
            timestamp: draft.timestamp.unwrap_or_else(|| self.clock.now()),
        }
    }

    fn lock_queue(&self) -> std::sync::MutexGuard<'_, VecDeque<Event>> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_draft(value: Value) -> Result<EventDraft, String> {
    let draft: EventDraft = serde_json::from_value(value).map_err(|e| e.to_string())?;
    draft.validate().map_err(|e| e.to_string())?;
    Ok(draft)
}

fn outcome_label(error: &EventError) -> &'static str {
    match error {
        EventError::Timeout(_) => "timeout",
        EventError::Unstorable(_) => "refused",
        _ => "failed",
    }
}
