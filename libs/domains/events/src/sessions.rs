use chrono::Duration;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::error::{EventError, EventResult};
use crate::models::{NewSession, Session, SessionQuery};
use crate::repository::SessionRepository;

/// Session lifecycle on top of a [`SessionRepository`]
pub struct SessionTracker<S: SessionRepository> {
    repository: Arc<S>,
    clock: SharedClock,
}

impl<S: SessionRepository> SessionTracker<S> {
    pub fn new(repository: Arc<S>, clock: SharedClock) -> Self {
        Self { repository, clock }
    }

    /// Create the session unless it already exists; returns the stored record.
    #[instrument(skip(self, new), fields(session_id = %new.session_id))]
    pub async fn create_session(&self, new: NewSession) -> EventResult<Session> {
        let session_id = new.session_id.clone();
        let created = self
            .repository
            .create_if_absent(Session::start(new, self.clock.now()))
            .await?;

        if created {
            tracing::info!(session_id = %session_id, "Session started");
        }

        self.repository
            .get(&session_id)
            .await?
            .ok_or(EventError::SessionNotFound(session_id))
    }

    /// One more event in the session. No-op for unknown or ended sessions.
    pub async fn update_activity(&self, session_id: &str) -> EventResult<()> {
        self.record_events(session_id, 1).await
    }

    pub async fn record_events(&self, session_id: &str, count: usize) -> EventResult<()> {
        let updated = self
            .repository
            .record_activity(session_id, self.clock.now(), count as i64)
            .await?;

        if updated.is_none() {
            tracing::debug!(session_id, "Activity for unknown or ended session ignored");
        }
        Ok(())
    }

    /// End the session. Ending an ended session returns it unchanged.
    #[instrument(skip(self))]
    pub async fn end_session(&self, session_id: &str) -> EventResult<Session> {
        if let Some(closed) = self.repository.close(session_id, self.clock.now()).await? {
            tracing::info!(
                session_id,
                duration_secs = closed.duration_secs,
                events = closed.event_count,
                "Session ended"
            );
            return Ok(closed);
        }

        self.repository
            .get(session_id)
            .await?
            .ok_or_else(|| EventError::SessionNotFound(session_id.to_string()))
    }

    pub async fn active_sessions(&self, user_id: Option<Uuid>) -> EventResult<Vec<Session>> {
        self.repository
            .list(&SessionQuery::active().for_user(user_id))
            .await
    }

    /// Close active sessions idle for longer than `threshold`, ending them at
    /// their last activity. Returns how many were closed.
    #[instrument(skip(self))]
    pub async fn sweep_inactive(&self, threshold: Duration) -> EventResult<usize> {
        let query = SessionQuery {
            is_active: Some(true),
            inactive_before: Some(self.clock.now() - threshold),
            ..Default::default()
        };

        let mut closed = 0;
        for session in self.repository.list(&query).await? {
            if self
                .repository
                .close(&session.session_id, session.last_activity_at)
                .await?
                .is_some()
            {
                closed += 1;
            }
        }

        if closed > 0 {
            tracing::info!(closed, "Closed inactive sessions");
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::memory::MemoryEventStore;
    use crate::repository::MockSessionRepository;
    use chrono::{TimeZone, Utc};

    fn tracker() -> (SessionTracker<MemoryEventStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()));
        let tracker = SessionTracker::new(Arc::new(MemoryEventStore::new()), clock.clone());
        (tracker, clock)
    }

    fn new_session(id: &str) -> NewSession {
        NewSession {
            session_id: id.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_session_duration_and_idempotent_end() {
        let (tracker, clock) = tracker();
        tracker.create_session(new_session("s-1")).await.unwrap();

        // Events at t=0, 5 and 12
        tracker.update_activity("s-1").await.unwrap();
        clock.advance(Duration::seconds(5));
        tracker.update_activity("s-1").await.unwrap();
        clock.advance(Duration::seconds(7));
        tracker.update_activity("s-1").await.unwrap();

        clock.advance(Duration::seconds(8));
        let ended = tracker.end_session("s-1").await.unwrap();
        assert_eq!(ended.duration_secs, Some(20));
        assert_eq!(ended.event_count, 3);
        assert!(!ended.is_active);

        clock.advance(Duration::seconds(5));
        let again = tracker.end_session("s-1").await.unwrap();
        assert_eq!(again, ended);
    }

    #[tokio::test]
    async fn test_create_session_twice_keeps_first_start() {
        let (tracker, clock) = tracker();
        let first = tracker.create_session(new_session("s-1")).await.unwrap();
        clock.advance(Duration::minutes(1));
        let second = tracker.create_session(new_session("s-1")).await.unwrap();

        assert_eq!(first.started_at, second.started_at);
    }

    #[tokio::test]
    async fn test_end_unknown_session_is_not_found() {
        let (tracker, _) = tracker();
        let err = tracker.end_session("nope").await.unwrap_err();
        assert!(matches!(err, EventError::SessionNotFound(id) if id == "nope"));
    }

    #[tokio::test]
    async fn test_activity_on_unknown_session_is_noop() {
        let (tracker, _) = tracker();
        tracker.update_activity("ghost").await.unwrap();
        assert!(tracker.active_sessions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_sessions_filters_by_user() {
        let (tracker, _) = tracker();
        let user = Uuid::new_v4();
        tracker
            .create_session(NewSession {
                user_id: Some(user),
                ..new_session("mine")
            })
            .await
            .unwrap();
        tracker.create_session(new_session("anon")).await.unwrap();
        tracker.create_session(new_session("done")).await.unwrap();
        tracker.end_session("done").await.unwrap();

        assert_eq!(tracker.active_sessions(None).await.unwrap().len(), 2);
        let mine = tracker.active_sessions(Some(user)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].session_id, "mine");
    }

    #[tokio::test]
    async fn test_sweep_closes_idle_sessions_at_last_activity() {
        let (tracker, clock) = tracker();
        tracker.create_session(new_session("idle")).await.unwrap();
        clock.advance(Duration::minutes(10));
        tracker.update_activity("idle").await.unwrap();
        let idle_last = clock.now();

        clock.advance(Duration::minutes(25));
        tracker.create_session(new_session("fresh")).await.unwrap();

        clock.advance(Duration::minutes(10));
        assert_eq!(tracker.sweep_inactive(Duration::minutes(30)).await.unwrap(), 1);

        let active = tracker.active_sessions(None).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, "fresh");

        let swept = tracker.end_session("idle").await.unwrap();
        assert_eq!(swept.ended_at, Some(idle_last));
        assert_eq!(swept.duration_secs, Some(600));
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let mut repo = MockSessionRepository::new();
        repo.expect_close()
            .returning(|_, _| Err(EventError::Unavailable("db down".into())));

        let clock = Arc::new(ManualClock::new(Utc::now()));
        let tracker = SessionTracker::new(Arc::new(repo), clock);

        let err = tracker.end_session("s-1").await.unwrap_err();
        assert!(err.is_transient());
    }
}
