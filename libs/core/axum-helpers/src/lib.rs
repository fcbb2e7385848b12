//! # Axum Helpers
//!
//! Shared HTTP plumbing for the telemetry services.
//!
//! - **[`server`]**: router assembly, health endpoints, graceful shutdown
//! - **[`errors`]**: [`AppError`] and the uniform [`ErrorResponse`] body
//! - **[`extractors`]**: validated JSON bodies and client network details

pub mod errors;
pub mod extractors;
pub mod server;

pub use errors::{AppError, ErrorCode, ErrorResponse};
pub use extractors::{ClientInfo, ValidatedJson, extract_ip_from_headers, extract_user_agent, header_str};
pub use server::{
    HealthCheckFuture, HealthResponse, ShutdownCoordinator, create_router, health_router,
    run_health_checks, serve, shutdown_signal,
};
