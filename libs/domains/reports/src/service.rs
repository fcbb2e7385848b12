use domain_analytics::DateRange;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::error::{ReportError, ReportResult};
use crate::generator::ReportGenerator;
use crate::models::{
    GenerateReportRequest, NewReport, Report, ReportAccepted, ReportFilter, ReportFormat,
    ReportPage,
};
use crate::render::{Rendered, render};
use crate::repository::ReportRepository;
use crate::scheduler::{JobRun, JobStatus, ReportScheduler};

/// The `/reports` boundary: on-demand generation, lookup, listing, download
/// and job control.
pub struct ReportService<R: ReportRepository + 'static> {
    generator: ReportGenerator<R>,
    scheduler: Arc<ReportScheduler>,
}

impl<R: ReportRepository + 'static> ReportService<R> {
    pub fn new(generator: ReportGenerator<R>, scheduler: Arc<ReportScheduler>) -> Self {
        Self {
            generator,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> &Arc<ReportScheduler> {
        &self.scheduler
    }

    /// Accept a report request and generate it in the background
    #[instrument(skip(self, request), fields(report_type = %request.report_type))]
    pub async fn generate(
        &self,
        request: GenerateReportRequest,
        caller: Option<Uuid>,
    ) -> ReportResult<ReportAccepted> {
        request.validate()?;
        let range = DateRange::new(request.start, request.end)
            .map_err(|e| ReportError::Validation(e.to_string()))?;

        let mut new = NewReport::new(request.report_type, range)
            .with_format(request.format)
            .generated_by(caller.map_or_else(|| "api".to_string(), |id| id.to_string()));
        if let Some(user_id) = request.user_id {
            new = new.for_user(user_id);
        }
        if let Some(name) = request.name {
            new = new.named(name);
        }

        let report = self.generator.generate_detached(new).await?;
        Ok(ReportAccepted {
            id: report.id,
            status: report.status,
        })
    }

    pub async fn get(&self, id: Uuid) -> ReportResult<Report> {
        self.generator
            .repository()
            .get(id)
            .await?
            .ok_or(ReportError::NotFound(id))
    }

    pub async fn list(&self, filter: &ReportFilter) -> ReportResult<ReportPage> {
        if matches!(
            (filter.created_from, filter.created_to),
            (Some(from), Some(to)) if from > to
        ) {
            return Err(ReportError::Validation(
                "created_from must not be after created_to".into(),
            ));
        }
        self.generator.repository().list(filter).await
    }

    /// Render a completed report, in its stored format unless overridden
    pub async fn download(&self, id: Uuid, format: Option<ReportFormat>) -> ReportResult<Rendered> {
        let report = self.get(id).await?;
        render(&report, format.unwrap_or(report.format))
    }

    pub fn jobs(&self) -> Vec<JobStatus> {
        self.scheduler.statuses()
    }

    pub async fn run_job(&self, name: &str) -> ReportResult<JobRun> {
        self.scheduler.trigger(name).await
    }
}
