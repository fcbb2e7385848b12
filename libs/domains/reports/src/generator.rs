use async_trait::async_trait;
use domain_analytics::{AggregationEngine, Dashboard, DateRange};
use domain_events::{EventRepository, SessionRepository, SharedClock};
use observability::reports::ReportMetrics;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{ReportError, ReportResult};
use crate::models::{NewReport, Report};
use crate::repository::ReportRepository;

/// Produces the payload stored on a completed report
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PayloadBuilder: Send + Sync {
    async fn build(&self, range: DateRange, user_id: Option<Uuid>) -> ReportResult<Value>;
}

/// Stored payload: the dashboard for the window plus its event count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPayload {
    pub event_count: u64,
    #[serde(flatten)]
    pub summary: Dashboard,
}

#[async_trait]
impl<E, S> PayloadBuilder for AggregationEngine<E, S>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
{
    async fn build(&self, range: DateRange, user_id: Option<Uuid>) -> ReportResult<Value> {
        let summary = self.dashboard(range, user_id).await?;
        let payload = ReportPayload {
            event_count: summary.engagement.total_events,
            summary,
        };
        serde_json::to_value(payload).map_err(|e| ReportError::Render(e.to_string()))
    }
}

/// Drives a report through `generating → completed | failed`.
///
/// The payload is built on its own task so a panic surfaces as a `JoinError`
/// and still ends in `failed`. Detached runs are tracked so shutdown can wait
/// for them; whatever is still running after the grace period is failed.
pub struct ReportGenerator<R: ReportRepository> {
    builder: Arc<dyn PayloadBuilder>,
    repository: Arc<R>,
    clock: SharedClock,
    in_flight: Arc<Mutex<InFlight>>,
}

/// Detached runs and the reports they are working on
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<()>,
    reports: HashSet<Uuid>,
}

impl<R: ReportRepository> Clone for ReportGenerator<R> {
    fn clone(&self) -> Self {
        Self {
            builder: self.builder.clone(),
            repository: self.repository.clone(),
            clock: self.clock.clone(),
            in_flight: self.in_flight.clone(),
        }
    }
}

pub const INTERRUPTED_MESSAGE: &str = "generation was interrupted by a shutdown";
pub const ABANDONED_MESSAGE: &str = "generation was abandoned; no worker finished it";

impl<R: ReportRepository + 'static> ReportGenerator<R> {
    pub fn new(builder: Arc<dyn PayloadBuilder>, repository: Arc<R>, clock: SharedClock) -> Self {
        Self {
            builder,
            repository,
            clock,
            in_flight: Arc::new(Mutex::new(InFlight::default())),
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Persist a new report in `generating`
    pub async fn start(&self, new: NewReport) -> ReportResult<Report> {
        let report = self
            .repository
            .create(Report::start(new, self.clock.now()))
            .await?;
        tracing::info!(
            report_id = %report.id,
            report_type = %report.report_type,
            start = %report.range.start,
            end = %report.range.end,
            "Report generation started"
        );
        Ok(report)
    }

    /// Build the payload and record the terminal status. A payload that
    /// cannot be stored fails the report instead of leaving it `generating`.
    #[instrument(skip(self, report), fields(report_id = %report.id))]
    pub async fn run(&self, mut report: Report) -> ReportResult<Report> {
        let builder = self.builder.clone();
        let (range, user_id) = (report.range, report.user_id);
        let outcome = tokio::spawn(async move { builder.build(range, user_id).await }).await;

        let now = self.clock.now();
        let failure = match outcome {
            Ok(Ok(payload)) => match self.repository.complete(report.id, payload.clone(), now).await {
                Ok(true) => {
                    report.complete(payload, now);
                    tracing::info!("Report completed");
                    None
                }
                Ok(false) => return self.finished_elsewhere(report.id).await,
                Err(e) => {
                    tracing::error!(error = %e, "Could not store report payload");
                    Some(format!("could not store payload: {}", e))
                }
            },
            Ok(Err(e)) => {
                let message = e.to_string();
                tracing::error!(error = %message, "Report generation failed");
                Some(message)
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    format!("generation panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    "generation was cancelled".to_string()
                };
                tracing::error!(error = %message, "Report generation aborted");
                Some(message)
            }
        };

        if let Some(message) = failure {
            if !self.repository.fail(report.id, message.clone(), now).await? {
                return self.finished_elsewhere(report.id).await;
            }
            report.fail(message, now);
        }

        ReportMetrics::record_report(&report.report_type.to_string(), &report.status.to_string());
        Ok(report)
    }

    /// The report left `generating` before this run could record its
    /// outcome; return what the store holds.
    async fn finished_elsewhere(&self, id: Uuid) -> ReportResult<Report> {
        let stored = self
            .repository
            .get(id)
            .await?
            .ok_or(ReportError::NotFound(id))?;
        tracing::warn!(status = %stored.status, "Report was already finished; outcome discarded");
        Ok(stored)
    }

    /// Create and generate, returning the terminal report
    pub async fn generate(&self, new: NewReport) -> ReportResult<Report> {
        let report = self.start(new).await?;
        self.run(report).await
    }

    /// Create the report and generate it in the background. The returned
    /// report is still `generating`.
    pub async fn generate_detached(&self, new: NewReport) -> ReportResult<Report> {
        let report = self.start(new).await?;
        let generator = self.clone();
        let pending = report.clone();

        {
            let mut in_flight = self.lock_in_flight();
            while in_flight.tasks.try_join_next().is_some() {}
            in_flight.reports.insert(report.id);
            in_flight.tasks.spawn(async move {
                let id = pending.id;
                if let Err(e) = generator.run(pending).await {
                    tracing::error!(report_id = %id, error = %e, "Failed to record report outcome");
                }
                generator.lock_in_flight().reports.remove(&id);
            });
        }
        Ok(report)
    }

    /// Detached runs still going
    pub fn in_flight(&self) -> usize {
        self.lock_in_flight().reports.len()
    }

    /// Wait up to `grace` for detached runs, then abort the rest and mark
    /// their reports failed. Returns how many were interrupted.
    pub async fn drain(&self, grace: Duration) -> usize {
        let mut tasks = std::mem::take(&mut self.lock_in_flight().tasks);
        if tasks.is_empty() {
            return 0;
        }

        tracing::info!(pending = tasks.len(), "Waiting for detached report generation");
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_ok() {
            return 0;
        }

        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        let interrupted: Vec<Uuid> = self.lock_in_flight().reports.drain().collect();
        let now = self.clock.now();
        for id in &interrupted {
            match self.repository.fail(*id, INTERRUPTED_MESSAGE.to_string(), now).await {
                Ok(_) => tracing::warn!(report_id = %id, "Report generation interrupted"),
                Err(e) => {
                    tracing::error!(report_id = %id, error = %e, "Could not fail interrupted report")
                }
            }
        }
        ReportMetrics::record_interrupted("shutdown", interrupted.len() as u64);
        interrupted.len()
    }

    /// Fail reports left `generating` for longer than `timeout`, typically by
    /// a process that died mid-run.
    pub async fn fail_abandoned(&self, timeout: chrono::Duration) -> ReportResult<u64> {
        let now = self.clock.now();
        let failed = self
            .repository
            .fail_generating_before(now - timeout, ABANDONED_MESSAGE.to_string(), now)
            .await?;
        if failed > 0 {
            tracing::warn!(failed, "Failed reports abandoned in generating");
            ReportMetrics::record_interrupted("abandoned", failed);
        }
        Ok(failed)
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
