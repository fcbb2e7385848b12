use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde_json::Value;
use uuid::Uuid;

use crate::entity;
use crate::error::ReportResult;
use crate::models::{Report, ReportFilter, ReportPage, ReportStatus};
use crate::repository::ReportRepository;

/// Postgres-backed report store
#[derive(Clone)]
pub struct PgReportRepository {
    db: DatabaseConnection,
}

impl PgReportRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn filtered(filter: &ReportFilter) -> sea_orm::Select<entity::Entity> {
        let mut select = entity::Entity::find();

        if let Some(report_type) = filter.report_type {
            select = select.filter(entity::Column::ReportType.eq(report_type));
        }
        if let Some(status) = filter.status {
            select = select.filter(entity::Column::Status.eq(status));
        }
        if let Some(user_id) = filter.user_id {
            select = select.filter(entity::Column::UserId.eq(user_id));
        }
        if let Some(from) = filter.created_from {
            select = select.filter(entity::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.created_to {
            select = select.filter(entity::Column::CreatedAt.lte(to));
        }

        select
    }

    /// Conditional `UPDATE ... WHERE status = 'generating'`, so a report
    /// reaches a terminal status at most once.
    async fn finish(&self, id: Uuid, terminal: entity::ActiveModel) -> ReportResult<bool> {
        let result = entity::Entity::update_many()
            .set(terminal)
            .filter(entity::Column::Id.eq(id))
            .filter(entity::Column::Status.eq(ReportStatus::Generating))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected == 1)
    }
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn create(&self, report: Report) -> ReportResult<Report> {
        let active: entity::ActiveModel = report.into();
        let model = active.insert(&self.db).await?;
        Ok(model.into())
    }

    async fn get(&self, id: Uuid) -> ReportResult<Option<Report>> {
        let model = entity::Entity::find_by_id(id).one(&self.db).await?;
        Ok(model.map(Into::into))
    }

    async fn list(&self, filter: &ReportFilter) -> ReportResult<ReportPage> {
        let total = Self::filtered(filter).count(&self.db).await?;
        let limit = filter.page_size();

        let models = Self::filtered(filter)
            .order_by_desc(entity::Column::CreatedAt)
            .order_by_desc(entity::Column::Id)
            .limit(limit)
            .offset(filter.offset)
            .all(&self.db)
            .await?;

        let items = models
            .into_iter()
            .map(|m| Report {
                payload: None,
                ..m.into()
            })
            .collect();

        Ok(ReportPage {
            items,
            total,
            limit,
            offset: filter.offset,
        })
    }

    async fn complete(&self, id: Uuid, payload: Value, at: DateTime<Utc>) -> ReportResult<bool> {
        self.finish(
            id,
            entity::ActiveModel {
                status: Set(ReportStatus::Completed),
                payload: Set(Some(payload)),
                generated_at: Set(Some(at.into())),
                ..Default::default()
            },
        )
        .await
    }

    async fn fail(&self, id: Uuid, message: String, at: DateTime<Utc>) -> ReportResult<bool> {
        self.finish(
            id,
            entity::ActiveModel {
                status: Set(ReportStatus::Failed),
                error_message: Set(Some(message)),
                generated_at: Set(Some(at.into())),
                ..Default::default()
            },
        )
        .await
    }

    async fn fail_generating_before(
        &self,
        cutoff: DateTime<Utc>,
        message: String,
        at: DateTime<Utc>,
    ) -> ReportResult<u64> {
        let result = entity::Entity::update_many()
            .set(entity::ActiveModel {
                status: Set(ReportStatus::Failed),
                error_message: Set(Some(message)),
                generated_at: Set(Some(at.into())),
                ..Default::default()
            })
            .filter(entity::Column::Status.eq(ReportStatus::Generating))
            .filter(entity::Column::CreatedAt.lt(cutoff))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> ReportResult<u64> {
        let result = entity::Entity::delete_many()
            .filter(entity::Column::CreatedAt.lt(cutoff))
            .exec(&self.db)
            .await?;

        tracing::info!(deleted = result.rows_affected, %cutoff, "Deleted expired reports");
        Ok(result.rows_affected)
    }
}
