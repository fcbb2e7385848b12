//! User directory seam.
//!
//! Accounts live outside the telemetry pipeline; the engine only needs to
//! count sign-ups in a window and hand engagement scores back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::AnalyticsResult;
use crate::models::EngagementScore;
use crate::range::DateRange;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Users whose account was created inside `range`
    async fn count_new_users(&self, range: &DateRange) -> AnalyticsResult<u64>;

    /// Replace the stored engagement scores
    async fn record_engagement_scores(&self, scores: &[EngagementScore]) -> AnalyticsResult<()>;
}

/// Directory kept in memory, fed by whoever registers users
#[derive(Debug, Default)]
pub struct InMemoryUserDirectory {
    created: RwLock<HashMap<Uuid, DateTime<Utc>>>,
    scores: RwLock<HashMap<Uuid, EngagementScore>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_user(&self, user_id: Uuid, created_at: DateTime<Utc>) {
        self.created.write().await.entry(user_id).or_insert(created_at);
    }

    pub async fn score_for(&self, user_id: Uuid) -> Option<EngagementScore> {
        self.scores.read().await.get(&user_id).cloned()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn count_new_users(&self, range: &DateRange) -> AnalyticsResult<u64> {
        let created = self.created.read().await;
        Ok(created.values().filter(|at| range.contains(**at)).count() as u64)
    }

    async fn record_engagement_scores(&self, scores: &[EngagementScore]) -> AnalyticsResult<()> {
        let mut stored = self.scores.write().await;
        stored.clear();
        stored.extend(scores.iter().map(|s| (s.user_id, s.clone())));
        Ok(())
    }
}
