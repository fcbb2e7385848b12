use sea_orm_migration::sea_query::extension::postgres::Type;
use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_type(
                Type::create()
                    .as_enum(ReportType::Enum)
                    .values([
                        ReportType::Daily,
                        ReportType::Weekly,
                        ReportType::Monthly,
                        ReportType::Custom,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(ReportStatus::Enum)
                    .values([
                        ReportStatus::Generating,
                        ReportStatus::Completed,
                        ReportStatus::Failed,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_type(
                Type::create()
                    .as_enum(ReportFormat::Enum)
                    .values([ReportFormat::Json, ReportFormat::Csv])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Reports::Table)
                    .if_not_exists()
                    .col(pk_uuid(Reports::Id))
                    .col(
                        ColumnDef::new(Reports::ReportType)
                            .enumeration(
                                ReportType::Enum,
                                [
                                    ReportType::Daily,
                                    ReportType::Weekly,
                                    ReportType::Monthly,
                                    ReportType::Custom,
                                ],
                            )
                            .not_null(),
                    )
                    .col(string(Reports::Name))
                    .col(uuid_null(Reports::UserId))
                    .col(timestamp_with_time_zone(Reports::RangeStart))
                    .col(timestamp_with_time_zone(Reports::RangeEnd))
                    .col(json_binary_null(Reports::Payload))
                    .col(timestamp_with_time_zone_null(Reports::GeneratedAt))
                    .col(string(Reports::GeneratedBy))
                    .col(
                        ColumnDef::new(Reports::Format)
                            .enumeration(ReportFormat::Enum, [ReportFormat::Json, ReportFormat::Csv])
                            .not_null()
                            .default("json"),
                    )
                    .col(
                        ColumnDef::new(Reports::Status)
                            .enumeration(
                                ReportStatus::Enum,
                                [
                                    ReportStatus::Generating,
                                    ReportStatus::Completed,
                                    ReportStatus::Failed,
                                ],
                            )
                            .not_null()
                            .default("generating"),
                    )
                    .col(text_null(Reports::ErrorMessage))
                    .col(
                        timestamp_with_time_zone(Reports::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reports_created_at")
                    .table(Reports::Table)
                    .col(Reports::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reports_type_created_at")
                    .table(Reports::Table)
                    .col(Reports::ReportType)
                    .col(Reports::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_reports_user_id")
                    .table(Reports::Table)
                    .col(Reports::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Reports::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(ReportFormat::Enum).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(ReportStatus::Enum).to_owned())
            .await?;
        manager
            .drop_type(Type::drop().name(ReportType::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Reports {
    Table,
    Id,
    ReportType,
    Name,
    UserId,
    RangeStart,
    RangeEnd,
    Payload,
    GeneratedAt,
    GeneratedBy,
    Format,
    Status,
    ErrorMessage,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ReportType {
    #[sea_orm(iden = "report_type")]
    Enum,
    #[sea_orm(iden = "daily")]
    Daily,
    #[sea_orm(iden = "weekly")]
    Weekly,
    #[sea_orm(iden = "monthly")]
    Monthly,
    #[sea_orm(iden = "custom")]
    Custom,
}

#[derive(DeriveIden)]
enum ReportStatus {
    #[sea_orm(iden = "report_status")]
    Enum,
    #[sea_orm(iden = "generating")]
    Generating,
    #[sea_orm(iden = "completed")]
    Completed,
    #[sea_orm(iden = "failed")]
    Failed,
}

#[derive(DeriveIden)]
enum ReportFormat {
    #[sea_orm(iden = "report_format")]
    Enum,
    #[sea_orm(iden = "json")]
    Json,
    #[sea_orm(iden = "csv")]
    Csv,
}
