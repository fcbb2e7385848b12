//! HTTP handlers for reports and scheduler jobs

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_helpers::{ErrorResponse, ValidatedJson};
use domain_events::RequestContext;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::error::ReportError;
use crate::models::{
    DownloadParams, GenerateReportRequest, Report, ReportAccepted, ReportFilter, ReportPage,
};
use crate::repository::ReportRepository;
use crate::scheduler::{JobRun, JobStatus};
use crate::service::ReportService;

pub type ReportState<R> = Arc<ReportService<R>>;

/// Routes mounted under `/reports`
pub fn reports_router<R: ReportRepository + 'static>(service: ReportState<R>) -> Router {
    Router::new()
        .route("/", get(list_reports::<R>).post(generate_report::<R>))
        .route("/jobs", get(list_jobs::<R>))
        .route("/jobs/{name}/run", post(run_job::<R>))
        .route("/{id}", get(get_report::<R>))
        .route("/{id}/download", get(download_report::<R>))
        .with_state(service)
}

/// Request a report; generation continues in the background
#[utoipa::path(
    post,
    path = "/api/reports",
    request_body = GenerateReportRequest,
    responses(
        (status = 202, description = "Report accepted", body = ReportAccepted),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "reports"
)]
#[instrument(skip_all, fields(report_type = %request.report_type))]
pub async fn generate_report<R: ReportRepository + 'static>(
    State(service): State<ReportState<R>>,
    ctx: RequestContext,
    ValidatedJson(request): ValidatedJson<GenerateReportRequest>,
) -> Result<impl IntoResponse, ReportError> {
    let accepted = service.generate(request, ctx.user_id).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

#[utoipa::path(
    get,
    path = "/api/reports/{id}",
    params(("id" = Uuid, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report with payload", body = Report),
        (status = 404, description = "Unknown report", body = ErrorResponse)
    ),
    tag = "reports"
)]
#[instrument(skip_all, fields(report_id = %id))]
pub async fn get_report<R: ReportRepository + 'static>(
    State(service): State<ReportState<R>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Report>, ReportError> {
    Ok(Json(service.get(id).await?))
}

/// Report metadata, newest first
#[utoipa::path(
    get,
    path = "/api/reports",
    params(ReportFilter),
    responses(
        (status = 200, description = "One page of reports", body = ReportPage),
        (status = 400, description = "Invalid filter", body = ErrorResponse)
    ),
    tag = "reports"
)]
#[instrument(skip_all)]
pub async fn list_reports<R: ReportRepository + 'static>(
    State(service): State<ReportState<R>>,
    Query(filter): Query<ReportFilter>,
) -> Result<Json<ReportPage>, ReportError> {
    Ok(Json(service.list(&filter).await?))
}

/// Completed report as a JSON or CSV attachment
#[utoipa::path(
    get,
    path = "/api/reports/{id}/download",
    params(("id" = Uuid, Path, description = "Report id"), DownloadParams),
    responses(
        (status = 200, description = "Rendered report"),
        (status = 404, description = "Unknown report", body = ErrorResponse),
        (status = 409, description = "Report is not completed", body = ErrorResponse)
    ),
    tag = "reports"
)]
#[instrument(skip_all, fields(report_id = %id))]
pub async fn download_report<R: ReportRepository + 'static>(
    State(service): State<ReportState<R>>,
    Path(id): Path<Uuid>,
    Query(params): Query<DownloadParams>,
) -> Result<impl IntoResponse, ReportError> {
    let rendered = service.download(id, params.format).await?;
    let disposition = format!("attachment; filename=\"{}\"", rendered.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, rendered.content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        rendered.body,
    ))
}

#[utoipa::path(
    get,
    path = "/api/reports/jobs",
    responses(
        (status = 200, description = "Registered jobs", body = Vec<JobStatus>)
    ),
    tag = "reports"
)]
pub async fn list_jobs<R: ReportRepository + 'static>(
    State(service): State<ReportState<R>>,
) -> Json<Vec<JobStatus>> {
    Json(service.jobs())
}

/// Run a job now; skipped if it is already running
#[utoipa::path(
    post,
    path = "/api/reports/jobs/{name}/run",
    params(("name" = String, Path, description = "Job name, e.g. daily-report")),
    responses(
        (status = 200, description = "Run outcome", body = JobRun),
        (status = 404, description = "Unknown job", body = ErrorResponse)
    ),
    tag = "reports"
)]
#[instrument(skip_all, fields(job = %name))]
pub async fn run_job<R: ReportRepository + 'static>(
    State(service): State<ReportState<R>>,
    Path(name): Path<String>,
) -> Result<Json<JobRun>, ReportError> {
    Ok(Json(service.run_job(&name).await?))
}
