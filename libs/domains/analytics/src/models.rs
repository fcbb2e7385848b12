use chrono::{DateTime, Utc};
use domain_events::{Event, EventCategory, EventQuery};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::range::DateRange;

/// Optional narrowing applied before grouping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AggregateFilters {
    pub category: Option<EventCategory>,
    pub action: Option<String>,
    pub event_type: Option<String>,
    pub label: Option<String>,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
}

impl AggregateFilters {
    pub fn to_query(&self, range: &DateRange) -> EventQuery {
        EventQuery {
            start: Some(range.start),
            end: Some(range.end),
            user_id: self.user_id,
            session_id: self.session_id.clone(),
            category: self.category,
            action: self.action.clone(),
            event_type: self.event_type.clone(),
            label: self.label.clone(),
            limit: None,
        }
    }
}

/// One group of an aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AggregateRow {
    /// Group field name to the group's value
    pub group: BTreeMap<String, String>,
    pub count: u64,
    pub value_sum: f64,
    /// Mean over events that carry a value
    pub value_avg: Option<f64>,
    pub unique_users: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EngagementMetrics {
    pub active_users: usize,
    pub new_users: u64,
    pub total_events: u64,
    pub total_sessions: u64,
    pub avg_session_duration_secs: f64,
    pub avg_events_per_session: f64,
    pub retention_rate: f64,
    pub bounce_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FeatureUsageRow {
    pub feature: String,
    pub count: u64,
    pub unique_users: usize,
    pub avg_time_spent: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BusinessMetrics {
    pub paywall_views: u64,
    pub trials_started: u64,
    pub subscriptions: u64,
    pub renewals: u64,
    pub cancellations: u64,
    pub revenue: f64,
    pub conversion_rate: f64,
    pub churn_rate: f64,
}

/// Per-user engagement score in `[0, 100]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EngagementScore {
    pub user_id: Uuid,
    pub score: f64,
    pub active_days: usize,
    pub sessions: usize,
    pub events: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Dashboard {
    pub range: DateRange,
    pub engagement: EngagementMetrics,
    pub categories: Vec<AggregateRow>,
    pub top_features: Vec<FeatureUsageRow>,
    pub business: BusinessMetrics,
    /// Live counters; only filled for dashboard requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realtime: Option<RealtimeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RealtimeSnapshot {
    pub active_users_30m: usize,
    pub active_users_24h: usize,
    pub active_sessions: usize,
    pub recent_events: Vec<Event>,
    pub generated_at: DateTime<Utc>,
}

/// `GET /analytics/dashboard`
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DashboardParams {
    /// `7d`, `30d`, `90d`, `1y`; ignored when `start` and `end` are given
    pub period: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub user_id: Option<Uuid>,
}

/// `GET /analytics/aggregate`
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AggregateParams {
    /// Comma-separated group fields, e.g. `category,day`
    pub group_by: String,
    pub period: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub category: Option<EventCategory>,
    pub action: Option<String>,
    pub event_type: Option<String>,
    pub label: Option<String>,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
}

impl AggregateParams {
    pub fn filters(&self) -> AggregateFilters {
        AggregateFilters {
            category: self.category,
            action: self.action.clone(),
            event_type: self.event_type.clone(),
            label: self.label.clone(),
            user_id: self.user_id,
            session_id: self.session_id.clone(),
        }
    }
}

/// `GET /analytics/features`
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FeatureParams {
    pub period: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub user_id: Option<Uuid>,
    /// Top N features, default 10
    pub limit: Option<usize>,
}

/// `GET /analytics/realtime`
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RealtimeParams {
    /// Recent events to include, default 50
    pub recent: Option<usize>,
}
