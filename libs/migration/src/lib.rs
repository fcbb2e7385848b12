pub use sea_orm_migration::prelude::*;

mod m20260105_000001_create_analytics_events;
mod m20260105_000002_create_user_sessions;
mod m20260105_000003_create_reports;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260105_000001_create_analytics_events::Migration),
            Box::new(m20260105_000002_create_user_sessions::Migration),
            Box::new(m20260105_000003_create_reports::Migration),
        ]
    }
}
