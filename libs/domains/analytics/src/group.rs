use domain_events::Event;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::error::{AnalyticsError, AnalyticsResult};

/// Placeholder key for events without a value in the grouped field
pub const NONE_KEY: &str = "(none)";

/// Dimension an aggregate can be grouped by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GroupField {
    Category,
    Action,
    EventType,
    Label,
    UserId,
    SessionId,
    Platform,
    /// UTC calendar day, `YYYY-MM-DD`
    Day,
    /// UTC hour bucket, `YYYY-MM-DDTHH:00`
    Hour,
}

impl GroupField {
    pub fn key_for(&self, event: &Event) -> String {
        let key = match self {
            GroupField::Category => Some(event.category.to_string()),
            GroupField::Action => Some(event.action.clone()),
            GroupField::EventType => Some(event.event_type.clone()),
            GroupField::Label => event.label.clone(),
            GroupField::UserId => event.user_id.map(|u| u.to_string()),
            GroupField::SessionId => event.session_id.clone(),
            GroupField::Platform => event.context.platform.clone(),
            GroupField::Day => Some(event.timestamp.format("%Y-%m-%d").to_string()),
            GroupField::Hour => Some(event.timestamp.format("%Y-%m-%dT%H:00").to_string()),
        };
        key.unwrap_or_else(|| NONE_KEY.to_string())
    }

    /// Parse a comma-separated list such as `category,day`
    pub fn parse_list(raw: &str) -> AnalyticsResult<Vec<GroupField>> {
        let mut fields = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let field: GroupField = part
                .parse()
                .map_err(|_| AnalyticsError::InvalidGroupField(part.to_string()))?;
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        Ok(fields)
    }
}
