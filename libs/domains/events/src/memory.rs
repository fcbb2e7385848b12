//! In-process event and session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::EventResult;
use crate::models::{Event, EventQuery, Session, SessionQuery};
use crate::repository::{EventRepository, SessionRepository};

/// Keeps events and sessions in memory behind `RwLock`s.
///
/// Used by tests and by the API when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    events: RwLock<Vec<Event>>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    /// Every stored event in insertion order
    pub async fn all_events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl EventRepository for MemoryEventStore {
    async fn insert_batch(&self, events: &[Event]) -> EventResult<usize> {
        self.events.write().await.extend_from_slice(events);
        Ok(events.len())
    }

    async fn query(&self, query: &EventQuery) -> EventResult<Vec<Event>> {
        let events = self.events.read().await;
        let mut matched: Vec<Event> = events.iter().filter(|e| query.matches(e)).cloned().collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        if let Some(limit) = query.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn count(&self, query: &EventQuery) -> EventResult<u64> {
        let events = self.events.read().await;
        Ok(events.iter().filter(|e| query.matches(e)).count() as u64)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> EventResult<u64> {
        let mut events = self.events.write().await;
        let before = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        Ok((before - events.len()) as u64)
    }
}

#[async_trait]
impl SessionRepository for MemoryEventStore {
    async fn create_if_absent(&self, session: Session) -> EventResult<bool> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.session_id) {
            return Ok(false);
        }
        sessions.insert(session.session_id.clone(), session);
        Ok(true)
    }

    async fn get(&self, session_id: &str) -> EventResult<Option<Session>> {
        Ok(self.sessions.read().await.get(session_id).cloned())
    }

    async fn record_activity(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
        events: i64,
    ) -> EventResult<Option<Session>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .get_mut(session_id)
            .filter(|s| s.is_active)
            .map(|s| {
                s.last_activity_at = s.last_activity_at.max(at);
                s.event_count += events;
                s.clone()
            }))
    }

    async fn close(&self, session_id: &str, ended_at: DateTime<Utc>) -> EventResult<Option<Session>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions
            .get_mut(session_id)
            .filter(|s| s.is_active)
            .map(|s| {
                s.close(ended_at);
                s.clone()
            }))
    }

    async fn list(&self, query: &SessionQuery) -> EventResult<Vec<Session>> {
        let sessions = self.sessions.read().await;
        let mut matched: Vec<Session> = sessions.values().filter(|s| query.matches(s)).cloned().collect();
        matched.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(matched)
    }
}
