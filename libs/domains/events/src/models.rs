use chrono::{DateTime, Utc};
use sea_orm::{DbErr, DeriveActiveEnum, EnumIter};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;
use strum::Display;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Most drafts accepted in one `POST /events/batch`
pub const MAX_BATCH_EVENTS: usize = 500;

/// Postgres text and jsonb columns cannot hold U+0000
fn reject_nul(value: &str) -> Result<(), ValidationError> {
    if value.contains('\0') {
        return Err(ValidationError::new("nul_character"));
    }
    Ok(())
}

fn reject_nul_in_metadata(metadata: &Map<String, Value>) -> Result<(), ValidationError> {
    fn clean(value: &Value) -> bool {
        match value {
            Value::String(s) => !s.contains('\0'),
            Value::Array(items) => items.iter().all(clean),
            Value::Object(map) => map.iter().all(|(k, v)| !k.contains('\0') && clean(v)),
            _ => true,
        }
    }

    if metadata.iter().all(|(k, v)| !k.contains('\0') && clean(v)) {
        Ok(())
    } else {
        Err(ValidationError::new("nul_character"))
    }
}

/// Closed set of event categories
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    DeriveActiveEnum,
    EnumIter,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "event_category")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventCategory {
    #[sea_orm(string_value = "workout")]
    Workout,
    #[sea_orm(string_value = "nutrition")]
    Nutrition,
    #[sea_orm(string_value = "subscription")]
    Subscription,
    #[sea_orm(string_value = "navigation")]
    Navigation,
    #[sea_orm(string_value = "feature_usage")]
    FeatureUsage,
    #[sea_orm(string_value = "error")]
    Error,
}

// Parses the stored value through the `TryFrom<&str>` that `DeriveActiveEnum` generates
impl FromStr for EventCategory {
    type Err = DbErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

/// Where an event came from, as seen by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClientContext {
    pub platform: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub app_version: Option<String>,
}

/// Device description sent by the client alongside a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct DeviceInfo {
    #[validate(length(max = 32), custom(function = "reject_nul"))]
    pub platform: Option<String>,
    #[validate(length(max = 64), custom(function = "reject_nul"))]
    pub os_version: Option<String>,
    #[validate(length(max = 64), custom(function = "reject_nul"))]
    pub app_version: Option<String>,
    #[validate(length(max = 128), custom(function = "reject_nul"))]
    pub model: Option<String>,
}

/// A stored telemetry event. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    /// Free-form type, `{category}_{action}` unless the client supplied one
    pub event_type: String,
    pub category: EventCategory,
    pub action: String,
    pub label: Option<String>,
    pub value: Option<f64>,
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub context: ClientContext,
    pub timestamp: DateTime<Utc>,
}

/// Client-supplied, not yet validated event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema)]
pub struct EventDraft {
    pub category: EventCategory,
    #[validate(length(min = 1, max = 100), custom(function = "reject_nul"))]
    pub action: String,
    #[validate(length(max = 255), custom(function = "reject_nul"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[schema(value_type = Object)]
    #[validate(custom(function = "reject_nul_in_metadata"))]
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[validate(length(min = 1, max = 100), custom(function = "reject_nul"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    /// Client timestamp; the server stamps one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventDraft {
    pub fn new(category: EventCategory, action: impl Into<String>) -> Self {
        Self {
            category,
            action: action.into(),
            label: None,
            value: None,
            metadata: Map::new(),
            event_type: None,
            timestamp: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// `event_type` if set, otherwise `{category}_{action}`
    pub fn resolved_event_type(&self) -> String {
        self.event_type
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.category, self.action))
    }
}

/// Body of `POST /events/batch`
///
/// Events are kept as raw JSON so one malformed draft does not reject the
/// whole batch at the extractor. More than [`MAX_BATCH_EVENTS`] drafts are
/// answered with 413 so the client can split the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct BatchRequest {
    #[schema(value_type = Vec<EventDraft>)]
    pub events: Vec<Value>,
    #[validate(nested)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceInfo>,
}

/// Outcome of a batch ingestion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchReceipt {
    pub accepted: usize,
    pub rejected: usize,
}

/// Response of `POST /events`: the event was queued for the next flush
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrackReceipt {
    pub id: Uuid,
    pub event_type: String,
    pub queued: usize,
}

/// One client session, keyed by the client-generated id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    pub session_id: String,
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub device: DeviceInfo,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub is_active: bool,
    pub event_count: i64,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn start(new: NewSession, at: DateTime<Utc>) -> Self {
        Self {
            session_id: new.session_id,
            user_id: new.user_id,
            device: new.device,
            user_agent: new.user_agent,
            ip_address: new.ip_address,
            started_at: at,
            ended_at: None,
            duration_secs: None,
            is_active: true,
            event_count: 0,
            last_activity_at: at,
        }
    }

    /// Marks the session ended at `ended_at`
    pub fn close(&mut self, ended_at: DateTime<Utc>) {
        self.ended_at = Some(ended_at);
        self.duration_secs = Some((ended_at - self.started_at).num_seconds().max(0));
        self.is_active = false;
    }
}

/// What is known about a session when it is first seen
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Validate, ToSchema)]
pub struct NewSession {
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    pub user_id: Option<Uuid>,
    #[validate(nested)]
    #[serde(default)]
    pub device: DeviceInfo,
    #[serde(skip)]
    pub user_agent: Option<String>,
    #[serde(skip)]
    pub ip_address: Option<String>,
}

/// Event filter; every bound is inclusive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct EventQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub category: Option<EventCategory>,
    pub action: Option<String>,
    pub event_type: Option<String>,
    pub label: Option<String>,
    pub limit: Option<u64>,
}

impl EventQuery {
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn for_user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_category(mut self, category: EventCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.start.is_none_or(|start| event.timestamp >= start)
            && self.end.is_none_or(|end| event.timestamp <= end)
            && self.user_id.is_none_or(|id| event.user_id == Some(id))
            && self
                .session_id
                .as_deref()
                .is_none_or(|id| event.session_id.as_deref() == Some(id))
            && self.category.is_none_or(|c| event.category == c)
            && self.action.as_deref().is_none_or(|a| event.action == a)
            && self.event_type.as_deref().is_none_or(|t| event.event_type == t)
            && self
                .label
                .as_deref()
                .is_none_or(|l| event.label.as_deref() == Some(l))
    }
}

/// Session filter
#[derive(Debug, Clone, Default, PartialEq, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SessionQuery {
    pub user_id: Option<Uuid>,
    pub is_active: Option<bool>,
    /// Sessions that started at or after this instant
    pub started_from: Option<DateTime<Utc>>,
    /// Sessions that started at or before this instant
    pub started_to: Option<DateTime<Utc>>,
    /// Last activity at or after this instant
    pub active_since: Option<DateTime<Utc>>,
    /// Last activity strictly before this instant
    pub inactive_before: Option<DateTime<Utc>>,
}

impl SessionQuery {
    pub fn active() -> Self {
        Self {
            is_active: Some(true),
            ..Default::default()
        }
    }

    pub fn started_between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            started_from: Some(start),
            started_to: Some(end),
            ..Default::default()
        }
    }

    pub fn for_user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn matches(&self, session: &Session) -> bool {
        self.user_id.is_none_or(|id| session.user_id == Some(id))
            && self.is_active.is_none_or(|a| session.is_active == a)
            && self.started_from.is_none_or(|t| session.started_at >= t)
            && self.started_to.is_none_or(|t| session.started_at <= t)
            && self.active_since.is_none_or(|t| session.last_activity_at >= t)
            && self.inactive_before.is_none_or(|t| session.last_activity_at < t)
    }
}

/// Query for `GET /sessions/active`
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ActiveSessionsParams {
    pub user_id: Option<Uuid>,
}
