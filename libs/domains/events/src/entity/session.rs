use crate::models::DeviceInfo;
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM entity for the `user_sessions` table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: String,
    pub user_id: Option<Uuid>,
    pub platform: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    pub device_model: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub started_at: DateTimeWithTimeZone,
    pub ended_at: Option<DateTimeWithTimeZone>,
    pub duration_secs: Option<i64>,
    pub is_active: bool,
    pub event_count: i64,
    pub last_activity_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Session {
    fn from(model: Model) -> Self {
        Self {
            session_id: model.session_id,
            user_id: model.user_id,
            device: DeviceInfo {
                platform: model.platform,
                os_version: model.os_version,
                app_version: model.app_version,
                model: model.device_model,
            },
            user_agent: model.user_agent,
            ip_address: model.ip_address,
            started_at: model.started_at.into(),
            ended_at: model.ended_at.map(Into::into),
            duration_secs: model.duration_secs,
            is_active: model.is_active,
            event_count: model.event_count,
            last_activity_at: model.last_activity_at.into(),
        }
    }
}

impl From<crate::models::Session> for ActiveModel {
    fn from(session: crate::models::Session) -> Self {
        ActiveModel {
            session_id: Set(session.session_id),
            user_id: Set(session.user_id),
            platform: Set(session.device.platform),
            os_version: Set(session.device.os_version),
            app_version: Set(session.device.app_version),
            device_model: Set(session.device.model),
            user_agent: Set(session.user_agent),
            ip_address: Set(session.ip_address),
            started_at: Set(session.started_at.into()),
            ended_at: Set(session.ended_at.map(Into::into)),
            duration_secs: Set(session.duration_secs),
            is_active: Set(session.is_active),
            event_count: Set(session.event_count),
            last_activity_at: Set(session.last_activity_at.into()),
        }
    }
}
