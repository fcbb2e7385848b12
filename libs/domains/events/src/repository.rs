use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::EventResult;
use crate::models::{Event, EventQuery, Session, SessionQuery};

/// Append-only store of telemetry events
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Insert every event or none of them
    async fn insert_batch(&self, events: &[Event]) -> EventResult<usize>;

    /// Matching events, newest first
    async fn query(&self, query: &EventQuery) -> EventResult<Vec<Event>>;

    async fn count(&self, query: &EventQuery) -> EventResult<u64>;

    /// Evict events with `timestamp < cutoff`
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> EventResult<u64>;
}

/// Store of client sessions, one record per session id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert unless a session with the same id exists. Returns whether it was inserted.
    async fn create_if_absent(&self, session: Session) -> EventResult<bool>;

    async fn get(&self, session_id: &str) -> EventResult<Option<Session>>;

    /// Bump `last_activity_at` and `event_count` of an active session.
    /// Returns `None` when the session is unknown or already ended.
    async fn record_activity(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
        events: i64,
    ) -> EventResult<Option<Session>>;

    /// End an active session. Returns `None` when unknown or already ended.
    async fn close(&self, session_id: &str, ended_at: DateTime<Utc>) -> EventResult<Option<Session>>;

    async fn list(&self, query: &SessionQuery) -> EventResult<Vec<Session>>;
}
