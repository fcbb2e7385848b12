use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, SqlErr, TransactionTrait,
};

use crate::entity::{event, session};
use crate::error::EventResult;
use crate::models::{Event, EventQuery, Session, SessionQuery};
use crate::repository::{EventRepository, SessionRepository};

/// Postgres-backed event and session store
#[derive(Clone)]
pub struct PgEventStore {
    db: DatabaseConnection,
}

impl PgEventStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn filtered(query: &EventQuery) -> Select<event::Entity> {
        let mut select = event::Entity::find();

        if let Some(start) = query.start {
            select = select.filter(event::Column::Timestamp.gte(start));
        }
        if let Some(end) = query.end {
            select = select.filter(event::Column::Timestamp.lte(end));
        }
        if let Some(user_id) = query.user_id {
            select = select.filter(event::Column::UserId.eq(user_id));
        }
        if let Some(session_id) = &query.session_id {
            select = select.filter(event::Column::SessionId.eq(session_id.clone()));
        }
        if let Some(category) = query.category {
            select = select.filter(event::Column::Category.eq(category));
        }
        if let Some(action) = &query.action {
            select = select.filter(event::Column::Action.eq(action.clone()));
        }
        if let Some(event_type) = &query.event_type {
            select = select.filter(event::Column::EventType.eq(event_type.clone()));
        }
        if let Some(label) = &query.label {
            select = select.filter(event::Column::Label.eq(label.clone()));
        }

        select
    }

    /// Locks the session row, applies `change` when the session is still
    /// active and commits. Returns `None` for unknown or ended sessions.
    async fn update_active<F>(&self, session_id: &str, change: F) -> EventResult<Option<Session>>
    where
        F: FnOnce(&mut Session) + Send,
    {
        let txn = self.db.begin().await?;

        let Some(model) = session::Entity::find_by_id(session_id.to_string())
            .lock_exclusive()
            .one(&txn)
            .await?
        else {
            txn.rollback().await?;
            return Ok(None);
        };

        if !model.is_active {
            txn.rollback().await?;
            return Ok(None);
        }

        let mut current: Session = model.clone().into();
        change(&mut current);

        let mut active = model.into_active_model();
        active.ended_at = Set(current.ended_at.map(Into::into));
        active.duration_secs = Set(current.duration_secs);
        active.is_active = Set(current.is_active);
        active.event_count = Set(current.event_count);
        active.last_activity_at = Set(current.last_activity_at.into());
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(Some(updated.into()))
    }
}

#[async_trait]
impl EventRepository for PgEventStore {
    async fn insert_batch(&self, events: &[Event]) -> EventResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }

        // A single multi-row INSERT, so the batch lands or fails as a unit
        let models: Vec<event::ActiveModel> = events.iter().map(Into::into).collect();
        event::Entity::insert_many(models).exec(&self.db).await?;

        tracing::debug!(count = events.len(), "Inserted event batch");
        Ok(events.len())
    }

    async fn query(&self, query: &EventQuery) -> EventResult<Vec<Event>> {
        let mut select = Self::filtered(query)
            .order_by_desc(event::Column::Timestamp)
            .order_by_desc(event::Column::Id);

        if let Some(limit) = query.limit {
            select = select.limit(limit);
        }

        let models = select.all(&self.db).await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn count(&self, query: &EventQuery) -> EventResult<u64> {
        Ok(Self::filtered(query).count(&self.db).await?)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> EventResult<u64> {
        let result = event::Entity::delete_many()
            .filter(event::Column::Timestamp.lt(cutoff))
            .exec(&self.db)
            .await?;

        tracing::info!(deleted = result.rows_affected, %cutoff, "Evicted expired events");
        Ok(result.rows_affected)
    }
}

#[async_trait]
impl SessionRepository for PgEventStore {
    async fn create_if_absent(&self, session: Session) -> EventResult<bool> {
        if session::Entity::find_by_id(session.session_id.clone())
            .one(&self.db)
            .await?
            .is_some()
        {
            return Ok(false);
        }

        let active: session::ActiveModel = session.into();
        match active.insert(&self.db).await {
            Ok(_) => Ok(true),
            // Lost a race with a concurrent create of the same id
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, session_id: &str) -> EventResult<Option<Session>> {
        let model = session::Entity::find_by_id(session_id.to_string())
            .one(&self.db)
            .await?;
        Ok(model.map(Into::into))
    }

    async fn record_activity(
        &self,
        session_id: &str,
        at: DateTime<Utc>,
        events: i64,
    ) -> EventResult<Option<Session>> {
        self.update_active(session_id, |s| {
            s.last_activity_at = s.last_activity_at.max(at);
            s.event_count += events;
        })
        .await
    }

    async fn close(&self, session_id: &str, ended_at: DateTime<Utc>) -> EventResult<Option<Session>> {
        self.update_active(session_id, |s| s.close(ended_at)).await
    }

    async fn list(&self, query: &SessionQuery) -> EventResult<Vec<Session>> {
        let mut select = session::Entity::find();

        if let Some(user_id) = query.user_id {
            select = select.filter(session::Column::UserId.eq(user_id));
        }
        if let Some(is_active) = query.is_active {
            select = select.filter(session::Column::IsActive.eq(is_active));
        }
        if let Some(from) = query.started_from {
            select = select.filter(session::Column::StartedAt.gte(from));
        }
        if let Some(to) = query.started_to {
            select = select.filter(session::Column::StartedAt.lte(to));
        }
        if let Some(since) = query.active_since {
            select = select.filter(session::Column::LastActivityAt.gte(since));
        }
        if let Some(before) = query.inactive_before {
            select = select.filter(session::Column::LastActivityAt.lt(before));
        }

        let models = select
            .order_by_desc(session::Column::StartedAt)
            .all(&self.db)
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }
}
