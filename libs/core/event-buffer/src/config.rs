use core_config::{ConfigError, FromEnv, env_duration_ms, env_optional, env_or_default, env_parse};
use domain_events::MAX_BATCH_EVENTS;
use std::path::PathBuf;
use std::time::Duration;

/// Client buffer settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferConfig {
    /// Base URL of the ingestion service, e.g. `http://localhost:8080`
    pub endpoint: String,
    /// Queue length that triggers a flush
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Most recent drafts kept in the persisted pending queue
    pub pending_capacity: usize,
    /// Pending-queue file; memory only when unset
    pub pending_path: Option<PathBuf>,
    pub request_timeout: Duration,
    /// Idle time after which the next tracked event starts a new session
    pub session_timeout: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080".to_string(),
            batch_size: 20,
            flush_interval: Duration::from_secs(5),
            pending_capacity: 100,
            pending_path: None,
            request_timeout: Duration::from_secs(10),
            session_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl BufferConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_pending_capacity(mut self, capacity: usize) -> Self {
        self.pending_capacity = capacity;
        self
    }

    pub fn with_pending_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pending_path = Some(path.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Drafts per request: `batch_size`, capped at what the server accepts
    pub fn max_events_per_request(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_EVENTS)
    }
}

impl FromEnv for BufferConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut config = Self::new(env_or_default("TELEMETRY_ENDPOINT", &defaults.endpoint))
            .with_batch_size(env_parse("TELEMETRY_BATCH_SIZE", defaults.batch_size)?)
            .with_flush_interval(env_duration_ms(
                "TELEMETRY_FLUSH_INTERVAL_MS",
                defaults.flush_interval.as_millis() as u64,
            )?)
            .with_session_timeout(env_duration_ms(
                "TELEMETRY_SESSION_TIMEOUT_MS",
                defaults.session_timeout.as_millis() as u64,
            )?);
        if let Some(path) = env_optional("TELEMETRY_PENDING_PATH") {
            config = config.with_pending_path(path);
        }
        Ok(config)
    }
}
