use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use chrono::{DateTime, Utc};
use domain_events::EventError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid period '{0}': expected 7d, 30d, 90d, 1y or <n>d")]
    InvalidPeriod(String),

    #[error("Invalid range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Unknown group field '{0}'")]
    InvalidGroupField(String),

    #[error("Directory error: {0}")]
    Directory(String),

    #[error(transparent)]
    Store(#[from] EventError),
}

pub type AnalyticsResult<T> = Result<T, AnalyticsError>;

impl From<AnalyticsError> for AppError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::Store(e) => e.into(),
            AnalyticsError::Directory(msg) => AppError::InternalServerError(msg),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for AnalyticsError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
