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
                    .as_enum(EventCategory::Enum)
                    .values([
                        EventCategory::Workout,
                        EventCategory::Nutrition,
                        EventCategory::Subscription,
                        EventCategory::Navigation,
                        EventCategory::FeatureUsage,
                        EventCategory::Error,
                    ])
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AnalyticsEvents::Table)
                    .if_not_exists()
                    .col(pk_uuid(AnalyticsEvents::Id))
                    .col(uuid_null(AnalyticsEvents::UserId))
                    .col(string_null(AnalyticsEvents::SessionId))
                    .col(string(AnalyticsEvents::EventType))
                    .col(
                        ColumnDef::new(AnalyticsEvents::Category)
                            .enumeration(
                                EventCategory::Enum,
                                [
                                    EventCategory::Workout,
                                    EventCategory::Nutrition,
                                    EventCategory::Subscription,
                                    EventCategory::Navigation,
                                    EventCategory::FeatureUsage,
                                    EventCategory::Error,
                                ],
                            )
                            .not_null(),
                    )
                    .col(string(AnalyticsEvents::Action))
                    .col(string_null(AnalyticsEvents::Label))
                    .col(double_null(AnalyticsEvents::Value))
                    .col(json_binary(AnalyticsEvents::Metadata).default(Expr::cust("'{}'::jsonb")))
                    .col(string_null(AnalyticsEvents::Platform))
                    .col(text_null(AnalyticsEvents::UserAgent))
                    .col(string_null(AnalyticsEvents::IpAddress))
                    .col(string_null(AnalyticsEvents::AppVersion))
                    .col(timestamp_with_time_zone(AnalyticsEvents::Timestamp))
                    .col(
                        timestamp_with_time_zone(AnalyticsEvents::ReceivedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Window scans, retention eviction and the realtime feed all order by timestamp
        manager
            .create_index(
                Index::create()
                    .name("idx_analytics_events_timestamp")
                    .table(AnalyticsEvents::Table)
                    .col(AnalyticsEvents::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_analytics_events_user_timestamp")
                    .table(AnalyticsEvents::Table)
                    .col(AnalyticsEvents::UserId)
                    .col(AnalyticsEvents::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_analytics_events_category_timestamp")
                    .table(AnalyticsEvents::Table)
                    .col(AnalyticsEvents::Category)
                    .col(AnalyticsEvents::Timestamp)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_analytics_events_session_id")
                    .table(AnalyticsEvents::Table)
                    .col(AnalyticsEvents::SessionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AnalyticsEvents::Table).to_owned())
            .await?;

        manager
            .drop_type(Type::drop().name(EventCategory::Enum).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum AnalyticsEvents {
    Table,
    Id,
    UserId,
    SessionId,
    EventType,
    Category,
    Action,
    Label,
    Value,
    Metadata,
    Platform,
    UserAgent,
    IpAddress,
    AppVersion,
    Timestamp,
    ReceivedAt,
}

#[derive(DeriveIden)]
enum EventCategory {
    #[sea_orm(iden = "event_category")]
    Enum,
    #[sea_orm(iden = "workout")]
    Workout,
    #[sea_orm(iden = "nutrition")]
    Nutrition,
    #[sea_orm(iden = "subscription")]
    Subscription,
    #[sea_orm(iden = "navigation")]
    Navigation,
    #[sea_orm(iden = "feature_usage")]
    FeatureUsage,
    #[sea_orm(iden = "error")]
    Error,
}
