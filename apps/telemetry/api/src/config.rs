//! Configuration for the telemetry API

use core_config::{AppInfo, FromEnv, app_info, env_optional, server::ServerConfig};
use database::postgres::PostgresConfig;
use domain_events::IngestionConfig;
use domain_reports::{ReportConfig, StaticRecipients};

pub use core_config::Environment;

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub environment: Environment,
    pub server: ServerConfig,
    /// Unset `DATABASE_URL` runs the pipeline on the in-memory stores
    pub database: Option<PostgresConfig>,
    pub ingestion: IngestionConfig,
    pub reports: ReportConfig,
    pub recipients: StaticRecipients,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let database = match env_optional("DATABASE_URL") {
            Some(_) => Some(PostgresConfig::from_env()?),
            None => None,
        };

        Ok(Self {
            app: app_info!(),
            environment: Environment::from_env(),
            server: ServerConfig::from_env()?,
            database,
            ingestion: IngestionConfig::from_env()?,
            reports: ReportConfig::from_env()?,
            recipients: StaticRecipients::from_env()?,
        })
    }
}
