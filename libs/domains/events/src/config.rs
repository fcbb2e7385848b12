use core_config::{ConfigError, FromEnv, env_duration_ms, env_parse};
use std::time::Duration;

/// Server-side ingestion tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionConfig {
    /// Queue length that wakes the flush loop early
    pub batch_size: usize,
    /// Period of the flush loop
    pub flush_interval: Duration,
    /// Upper bound on a single store write
    pub write_timeout: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            flush_interval: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
        }
    }
}

impl IngestionConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

impl FromEnv for IngestionConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self::default()
            .with_batch_size(env_parse("INGEST_BATCH_SIZE", defaults.batch_size)?)
            .with_flush_interval(env_duration_ms(
                "INGEST_FLUSH_INTERVAL_MS",
                defaults.flush_interval.as_millis() as u64,
            )?)
            .with_write_timeout(env_duration_ms(
                "INGEST_WRITE_TIMEOUT_MS",
                defaults.write_timeout.as_millis() as u64,
            )?))
    }
}
