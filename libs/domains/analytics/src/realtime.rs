use chrono::Duration;
use domain_events::{EventQuery, EventRepository, SessionQuery, SessionRepository, SharedClock};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AnalyticsResult;
use crate::models::RealtimeSnapshot;

pub const DEFAULT_RECENT_EVENTS: usize = 50;
const MAX_RECENT_EVENTS: usize = 500;

/// Live counters over short sliding windows. Holds no state between calls.
pub struct RealtimeMetrics<E: EventRepository, S: SessionRepository> {
    events: Arc<E>,
    sessions: Arc<S>,
    clock: SharedClock,
}

impl<E: EventRepository, S: SessionRepository> RealtimeMetrics<E, S> {
    pub fn new(events: Arc<E>, sessions: Arc<S>, clock: SharedClock) -> Self {
        Self {
            events,
            sessions,
            clock,
        }
    }

    pub async fn snapshot(&self) -> AnalyticsResult<RealtimeSnapshot> {
        self.snapshot_with(DEFAULT_RECENT_EVENTS).await
    }

    /// Snapshot with a preview feed of the `recent` newest events
    pub async fn snapshot_with(&self, recent: usize) -> AnalyticsResult<RealtimeSnapshot> {
        let now = self.clock.now();
        let half_hour_ago = now - Duration::minutes(30);
        let day_ago = now - Duration::hours(24);

        let last_day_query = EventQuery::between(day_ago, now);
        let active_query = SessionQuery {
            is_active: Some(true),
            active_since: Some(half_hour_ago),
            ..Default::default()
        };
        let recent_query =
            EventQuery::default().with_limit(recent.min(MAX_RECENT_EVENTS) as u64);

        let (last_day, active, recent_events) = tokio::try_join!(
            self.events.query(&last_day_query),
            self.sessions.list(&active_query),
            self.events.query(&recent_query),
        )?;

        let users_24h: HashSet<Uuid> = last_day.iter().filter_map(|e| e.user_id).collect();
        let users_30m: HashSet<Uuid> = last_day
            .iter()
            .filter(|e| e.timestamp >= half_hour_ago)
            .filter_map(|e| e.user_id)
            .collect();

        Ok(RealtimeSnapshot {
            active_users_30m: users_30m.len(),
            active_users_24h: users_24h.len(),
            active_sessions: active.len(),
            recent_events,
            generated_at: now,
        })
    }
}
