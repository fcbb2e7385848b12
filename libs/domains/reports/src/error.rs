use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use domain_analytics::AnalyticsError;
use domain_events::EventError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::ReportStatus;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report not found: {0}")]
    NotFound(Uuid),

    #[error("Report {id} is {status}; only completed reports can be downloaded")]
    NotReady { id: Uuid, status: ReportStatus },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error(transparent)]
    Analytics(#[from] AnalyticsError),

    #[error(transparent)]
    Events(#[from] EventError),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub type ReportResult<T> = Result<T, ReportError>;

impl From<validator::ValidationErrors> for ReportError {
    fn from(err: validator::ValidationErrors) -> Self {
        ReportError::Validation(err.to_string())
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for ReportError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        ReportError::Scheduler(err.to_string())
    }
}

impl From<ReportError> for AppError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::NotFound(id) => AppError::NotFound(format!("Report {} not found", id)),
            ReportError::NotReady { .. } => AppError::Conflict(err.to_string()),
            ReportError::Validation(msg) => AppError::BadRequest(msg),
            ReportError::UnknownJob(name) => AppError::NotFound(format!("Job {} not found", name)),
            ReportError::Analytics(e) => e.into(),
            ReportError::Events(e) => e.into(),
            ReportError::Database(e) => AppError::Database(e),
            ReportError::Scheduler(msg) | ReportError::Render(msg) => {
                AppError::InternalServerError(msg)
            }
        }
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        let cases = [
            (ReportError::NotFound(id), StatusCode::NOT_FOUND),
            (
                ReportError::NotReady {
                    id,
                    status: ReportStatus::Generating,
                },
                StatusCode::CONFLICT,
            ),
            (ReportError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (ReportError::Render("csv".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ReportError::Analytics(AnalyticsError::InvalidPeriod("2w".into())),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
