use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Batch of {events} events exceeds the limit of {max}")]
    BatchTooLarge { events: usize, max: usize },

    #[error("Event store refused the events: {0}")]
    Unstorable(String),

    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    #[error("Event store write timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

pub type EventResult<T> = Result<T, EventError>;

impl EventError {
    /// Transient failures the caller is expected to retry. A database error
    /// counts only when the connection itself failed; a rejected statement
    /// fails again on every retry.
    pub fn is_transient(&self) -> bool {
        match self {
            EventError::Unavailable(_) | EventError::Timeout(_) => true,
            EventError::Database(e) => {
                matches!(e, sea_orm::DbErr::Conn(_) | sea_orm::DbErr::ConnectionAcquire(_))
            }
            _ => false,
        }
    }
}

impl From<validator::ValidationErrors> for EventError {
    fn from(err: validator::ValidationErrors) -> Self {
        EventError::Validation(err.to_string())
    }
}

impl From<EventError> for AppError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::SessionNotFound(id) => AppError::NotFound(format!("Session {} not found", id)),
            EventError::Validation(msg) => AppError::BadRequest(msg),
            e @ EventError::BatchTooLarge { .. } => AppError::PayloadTooLarge(e.to_string()),
            EventError::Unstorable(msg) => AppError::BadRequest(msg),
            EventError::Unavailable(msg) => AppError::ServiceUnavailable(msg),
            EventError::Timeout(after) => {
                AppError::Timeout(format!("event store write exceeded {}ms", after.as_millis()))
            }
            EventError::Database(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for EventError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}
