//! Metrics for scheduled jobs and report generation.

use metrics::{counter, histogram};
use std::time::Duration;

/// Report and scheduler metrics recorder
pub struct ReportMetrics;

impl ReportMetrics {
    pub fn record_job_run(job: &str, success: bool, elapsed: Duration) {
        let outcome = if success { "success" } else { "failure" };
        counter!(
            "report_job_runs_total",
            "job" => job.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("report_job_duration_seconds", "job" => job.to_string())
            .record(elapsed.as_secs_f64());
    }

    pub fn record_job_skipped(job: &str) {
        counter!("report_job_skipped_total", "job" => job.to_string()).increment(1);
    }

    /// `status` is the terminal report status (`completed` or `failed`).
    pub fn record_report(report_type: &str, status: &str) {
        counter!(
            "reports_generated_total",
            "type" => report_type.to_string(),
            "status" => status.to_string()
        )
        .increment(1);
    }

    /// Reports failed because no run finished them. `reason` is
    /// `shutdown` or `abandoned`.
    pub fn record_interrupted(reason: &'static str, count: u64) {
        counter!("reports_interrupted_total", "reason" => reason).increment(count);
    }

    /// `kind` is `reports`, `events` or `sessions`.
    pub fn record_retention(kind: &'static str, deleted: u64) {
        counter!("retention_deleted_total", "kind" => kind).increment(deleted);
    }
}
