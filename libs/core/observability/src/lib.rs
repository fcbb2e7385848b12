//! Observability utilities for the telemetry pipeline.
//!
//! This crate provides:
//! - Prometheus recorder installation and the `/metrics` handler
//! - Typed recorders for ingestion, client flushes and report jobs
//! - Axum middleware for HTTP request metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler, IngestionMetrics};
//!
//! init_metrics()?;
//! IngestionMetrics::record_accepted("batch", 20);
//!
//! let app = Router::new().route("/metrics", get(metrics_handler));
//! ```

pub mod ingestion;
pub mod middleware;
pub mod reports;

pub use ingestion::{FlushSide, IngestionMetrics};
pub use middleware::metrics_middleware;
pub use reports::ReportMetrics;

pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder.
///
/// Call once at startup; later calls return the existing handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    METRICS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics recorder initialized");
        register_metric_descriptions();
        Ok(handle)
    })
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for /metrics endpoint
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!("http_requests_total", "Total number of HTTP requests");
    describe_histogram!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds"
    );
    describe_counter!(
        "http_requests_errors_total",
        "Total number of HTTP request errors"
    );

    describe_counter!(
        "telemetry_events_accepted_total",
        "Events written to the event store, by ingestion path"
    );
    describe_counter!(
        "telemetry_events_rejected_total",
        "Malformed event drafts rejected at the ingestion boundary"
    );
    describe_counter!(
        "telemetry_flushes_total",
        "Flush attempts by side (server/client) and outcome"
    );
    describe_histogram!(
        "telemetry_flush_duration_seconds",
        "Duration of event store writes"
    );
    describe_gauge!(
        "telemetry_queue_depth",
        "Events waiting in an in-process queue"
    );

    describe_counter!(
        "report_job_runs_total",
        "Scheduled job executions by job and outcome"
    );
    describe_counter!(
        "report_job_skipped_total",
        "Scheduled triggers skipped because the previous run was still active"
    );
    describe_histogram!(
        "report_job_duration_seconds",
        "Scheduled job duration in seconds"
    );
    describe_counter!(
        "reports_generated_total",
        "Reports reaching a terminal status, by type and status"
    );
    describe_counter!(
        "retention_deleted_total",
        "Records removed by retention cleanup, by kind"
    );
}
