//! Configuration for the report runner

use core_config::{Environment, FromEnv};
use database::postgres::PostgresConfig;
use domain_reports::{ReportConfig, StaticRecipients};

#[derive(Clone, Debug)]
pub struct Config {
    pub environment: Environment,
    pub database: PostgresConfig,
    pub reports: ReportConfig,
    pub recipients: StaticRecipients,
}

impl Config {
    /// Unlike the API, the runner always needs `DATABASE_URL`.
    pub fn from_env() -> eyre::Result<Self> {
        Ok(Self {
            environment: Environment::from_env(),
            database: PostgresConfig::from_env()?,
            reports: ReportConfig::from_env()?,
            recipients: StaticRecipients::from_env()?,
        })
    }
}
