use crate::models::{ClientContext, EventCategory};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM entity for the `analytics_events` table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analytics_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub event_type: String,
    pub category: EventCategory,
    pub action: String,
    pub label: Option<String>,
    pub value: Option<f64>,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,
    pub platform: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub app_version: Option<String>,
    pub timestamp: DateTimeWithTimeZone,
    pub received_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Event {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            session_id: model.session_id,
            event_type: model.event_type,
            category: model.category,
            action: model.action,
            label: model.label,
            value: model.value,
            metadata: match model.metadata {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
            context: ClientContext {
                platform: model.platform,
                user_agent: model.user_agent,
                ip_address: model.ip_address,
                app_version: model.app_version,
            },
            timestamp: model.timestamp.into(),
        }
    }
}

// received_at is left to the column default
impl From<&crate::models::Event> for ActiveModel {
    fn from(event: &crate::models::Event) -> Self {
        ActiveModel {
            id: Set(event.id),
            user_id: Set(event.user_id),
            session_id: Set(event.session_id.clone()),
            event_type: Set(event.event_type.clone()),
            category: Set(event.category),
            action: Set(event.action.clone()),
            label: Set(event.label.clone()),
            value: Set(event.value),
            metadata: Set(serde_json::Value::Object(event.metadata.clone())),
            platform: Set(event.context.platform.clone()),
            user_agent: Set(event.context.user_agent.clone()),
            ip_address: Set(event.context.ip_address.clone()),
            app_version: Set(event.context.app_version.clone()),
            timestamp: Set(event.timestamp.into()),
            received_at: NotSet,
        }
    }
}
