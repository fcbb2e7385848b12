use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserSessions::Table)
                    .if_not_exists()
                    .col(string(UserSessions::SessionId).primary_key())
                    .col(uuid_null(UserSessions::UserId))
                    .col(string_null(UserSessions::Platform))
                    .col(string_null(UserSessions::OsVersion))
                    .col(string_null(UserSessions::AppVersion))
                    .col(string_null(UserSessions::DeviceModel))
                    .col(text_null(UserSessions::UserAgent))
                    .col(string_null(UserSessions::IpAddress))
                    .col(timestamp_with_time_zone(UserSessions::StartedAt))
                    .col(timestamp_with_time_zone_null(UserSessions::EndedAt))
                    .col(big_integer_null(UserSessions::DurationSecs))
                    .col(boolean(UserSessions::IsActive).default(true))
                    .col(big_integer(UserSessions::EventCount).default(0))
                    .col(timestamp_with_time_zone(UserSessions::LastActivityAt))
                    .to_owned(),
            )
            .await?;

        // The inactivity sweep and realtime counts scan active sessions by last activity
        manager
            .create_index(
                Index::create()
                    .name("idx_user_sessions_active_last_activity")
                    .table(UserSessions::Table)
                    .col(UserSessions::IsActive)
                    .col(UserSessions::LastActivityAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_sessions_user_id")
                    .table(UserSessions::Table)
                    .col(UserSessions::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_sessions_started_at")
                    .table(UserSessions::Table)
                    .col(UserSessions::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserSessions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserSessions {
    Table,
    SessionId,
    UserId,
    Platform,
    OsVersion,
    AppVersion,
    DeviceModel,
    UserAgent,
    IpAddress,
    StartedAt,
    EndedAt,
    DurationSecs,
    IsActive,
    EventCount,
    LastActivityAt,
}
