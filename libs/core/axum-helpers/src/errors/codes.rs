//! Type-safe error codes for API responses.
//!
//! Each code has a string form for clients (e.g. `"VALIDATION_ERROR"`), an
//! integer for logs and dashboards, and a default message.
//!
//! ```rust
//! use axum_helpers::errors::ErrorCode;
//!
//! let code = ErrorCode::ValidationError;
//! assert_eq!(code.as_str(), "VALIDATION_ERROR");
//! assert_eq!(code.code(), 1001);
//! ```

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Client errors (1000-1999)
    /// Request validation failed
    ValidationError,
    /// Request body could not be parsed as JSON
    InvalidJson,
    /// Query string could not be parsed
    InvalidQuery,
    /// Requested resource was not found
    NotFound,
    /// Request conflicts with current resource state
    Conflict,
    /// Request carries more items than the endpoint accepts at once
    PayloadTooLarge,

    // Server errors (1500-1999)
    InternalError,
    /// A dependency (event store, report store) is temporarily unavailable
    ServiceUnavailable,
    /// A dependency did not answer within its deadline
    Timeout,

    // Database errors (2000-2999)
    DatabaseError,
    DatabaseNotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidJson => "INVALID_JSON",
            Self::InvalidQuery => "INVALID_QUERY",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::DatabaseNotFound => "DATABASE_NOT_FOUND",
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::ValidationError => 1001,
            Self::InvalidJson => 1002,
            Self::InvalidQuery => 1003,
            Self::NotFound => 1004,
            Self::Conflict => 1005,
            Self::PayloadTooLarge => 1006,
            Self::InternalError => 1500,
            Self::ServiceUnavailable => 1501,
            Self::Timeout => 1502,
            Self::DatabaseError => 2001,
            Self::DatabaseNotFound => 2002,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Self::ValidationError => "Request validation failed",
            Self::InvalidJson => "Request body is not valid JSON",
            Self::InvalidQuery => "Query parameters are invalid",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Resource state conflict",
            Self::PayloadTooLarge => "Request payload is too large",
            Self::InternalError => "An internal server error occurred",
            Self::ServiceUnavailable => "Service temporarily unavailable",
            Self::Timeout => "Upstream operation timed out",
            Self::DatabaseError => "Database operation failed",
            Self::DatabaseNotFound => "Database record not found",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 11] = [
        ErrorCode::ValidationError,
        ErrorCode::InvalidJson,
        ErrorCode::InvalidQuery,
        ErrorCode::NotFound,
        ErrorCode::Conflict,
        ErrorCode::PayloadTooLarge,
        ErrorCode::InternalError,
        ErrorCode::ServiceUnavailable,
        ErrorCode::Timeout,
        ErrorCode::DatabaseError,
        ErrorCode::DatabaseNotFound,
    ];

    #[test]
    fn test_codes_are_unique() {
        let codes: std::collections::HashSet<i32> = ALL.iter().map(ErrorCode::code).collect();
        assert_eq!(codes.len(), ALL.len());
    }

    #[test]
    fn test_serde_matches_as_str() {
        for code in ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }
}
