//! Reports Domain
//!
//! Materialised aggregation results and the jobs that produce them:
//!
//! ```text
//! ReportScheduler ──cron──► ReportJobs ──► ReportGenerator ──► PayloadBuilder (AggregationEngine)
//!                                │                 └──────────► ReportRepository
//!                                ├──► retention: reports + events
//!                                ├──► engagement scores ──► UserDirectory
//!                                └──► session sweep
//! POST /reports ──► ReportService ──► ReportGenerator (detached)
//! ```
//!
//! A report moves `generating → completed | failed` exactly once; the
//! generator records `failed` on builder errors and on panics.

use utoipa::OpenApi;

mod config;
pub mod entity;
mod error;
mod generator;
pub mod handlers;
mod jobs;
mod models;
mod postgres;
mod render;
mod repository;
mod scheduler;
mod service;
mod windows;

pub use config::{ReportConfig, parse_timezone};
pub use error::{ReportError, ReportResult};
pub use generator::{
    ABANDONED_MESSAGE, INTERRUPTED_MESSAGE, PayloadBuilder, ReportGenerator, ReportPayload,
};
pub use handlers::reports_router;
pub use jobs::{
    DAILY_REPORT, ENGAGEMENT_REFRESH, FanOutSummary, MONTHLY_REPORT, RETENTION_CLEANUP,
    ReportJobs, ReportRecipients, RetentionSummary, SESSION_SWEEP, StaticRecipients,
    WEEKLY_REPORT,
};
pub use models::{
    DownloadParams, GenerateReportRequest, MAX_PAGE_SIZE, NewReport, Report, ReportAccepted,
    ReportFilter, ReportFormat, ReportPage, ReportStatus, ReportType,
};
pub use postgres::PgReportRepository;
pub use render::{Rendered, render};
pub use repository::{InMemoryReportRepository, ReportRepository};
pub use scheduler::{Cadence, JobRun, JobStatus, JobTask, ReportScheduler};
pub use service::ReportService;
pub use windows::{daily_window, monthly_window, weekly_window};

/// OpenAPI documentation for report and job endpoints
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::generate_report,
        handlers::get_report,
        handlers::list_reports,
        handlers::download_report,
        handlers::list_jobs,
        handlers::run_job,
    ),
    components(schemas(
        GenerateReportRequest,
        JobRun,
        JobStatus,
        Report,
        ReportAccepted,
        ReportFormat,
        ReportPage,
        ReportStatus,
        ReportType,
    )),
    tags(
        (name = "reports", description = "Report generation and scheduled jobs")
    )
)]
pub struct ApiDoc;
