use crate::models::{ReportFormat, ReportStatus, ReportType};
use domain_analytics::DateRange;
use sea_orm::ActiveValue::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sea-ORM entity for the `reports` table
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reports")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub report_type: ReportType,
    pub name: String,
    pub user_id: Option<Uuid>,
    pub range_start: DateTimeWithTimeZone,
    pub range_end: DateTimeWithTimeZone,
    pub payload: Option<Json>,
    pub generated_at: Option<DateTimeWithTimeZone>,
    pub generated_by: String,
    pub format: ReportFormat,
    pub status: ReportStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for crate::models::Report {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            report_type: model.report_type,
            name: model.name,
            user_id: model.user_id,
            range: DateRange {
                start: model.range_start.into(),
                end: model.range_end.into(),
            },
            payload: model.payload,
            generated_at: model.generated_at.map(Into::into),
            generated_by: model.generated_by,
            format: model.format,
            status: model.status,
            error_message: model.error_message,
            created_at: model.created_at.into(),
        }
    }
}

impl From<crate::models::Report> for ActiveModel {
    fn from(report: crate::models::Report) -> Self {
        ActiveModel {
            id: Set(report.id),
            report_type: Set(report.report_type),
            name: Set(report.name),
            user_id: Set(report.user_id),
            range_start: Set(report.range.start.into()),
            range_end: Set(report.range.end.into()),
            payload: Set(report.payload),
            generated_at: Set(report.generated_at.map(Into::into)),
            generated_by: Set(report.generated_by),
            format: Set(report.format),
            status: Set(report.status),
            error_message: Set(report.error_message),
            created_at: Set(report.created_at.into()),
        }
    }
}
