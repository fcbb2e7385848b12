//! One-shot operations over the report jobs

use chrono::{DateTime, Utc};
use domain_analytics::{AggregationEngine, DateRange, UserDirectory};
use domain_events::{EventRepository, SessionRepository, SessionTracker, SharedClock};
use domain_reports::{
    JobRun, JobStatus, NewReport, Report, ReportConfig, ReportError, ReportFilter, ReportFormat,
    ReportGenerator, ReportJobs, ReportRecipients, ReportRepository, ReportResult,
    ReportScheduler, ReportType, RetentionSummary, daily_window, monthly_window, weekly_window,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Arguments of `report-runner generate`
#[derive(Debug, Clone)]
pub struct GenerateArgs {
    pub report_type: ReportType,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub user: Option<Uuid>,
    pub format: ReportFormat,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RunnerStatus {
    pub timezone: String,
    pub jobs: Vec<JobStatus>,
    pub total_reports: u64,
    pub recent_reports: Vec<Report>,
}

pub struct Runner<E, R>
where
    E: EventRepository + SessionRepository + 'static,
    R: ReportRepository + 'static,
{
    generator: ReportGenerator<R>,
    scheduler: Arc<ReportScheduler>,
    jobs: Arc<ReportJobs<E, E, R>>,
    clock: SharedClock,
}

impl<E, R> Runner<E, R>
where
    E: EventRepository + SessionRepository + 'static,
    R: ReportRepository + 'static,
{
    pub fn build(
        store: Arc<E>,
        report_store: Arc<R>,
        directory: Arc<dyn UserDirectory>,
        recipients: Arc<dyn ReportRecipients>,
        config: ReportConfig,
        clock: SharedClock,
    ) -> ReportResult<Self> {
        let engine = Arc::new(AggregationEngine::new(store.clone(), store.clone(), directory));
        let generator = ReportGenerator::new(engine.clone(), report_store, clock.clone());
        let sessions = Arc::new(SessionTracker::new(store.clone(), clock.clone()));
        let scheduler = Arc::new(ReportScheduler::new(config.timezone, clock.clone()));

        let jobs = Arc::new(ReportJobs::new(
            generator.clone(),
            engine,
            store,
            sessions,
            recipients,
            config,
            clock.clone(),
        ));
        jobs.register_defaults(&scheduler)?;

        Ok(Self {
            generator,
            scheduler,
            jobs,
            clock,
        })
    }

    pub fn scheduler(&self) -> &Arc<ReportScheduler> {
        &self.scheduler
    }

    /// Generate one report and wait for its terminal status. Without
    /// `--start`/`--end` the window is the type's most recent full period.
    pub async fn generate(&self, args: GenerateArgs) -> ReportResult<Report> {
        let range = self.resolve_range(&args)?;

        let mut new = NewReport::new(args.report_type, range)
            .with_format(args.format)
            .generated_by("cli");
        if let Some(user_id) = args.user {
            new = new.for_user(user_id);
        }
        if let Some(name) = args.name {
            new = new.named(name);
        }
        self.generator.generate(new).await
    }

    fn resolve_range(&self, args: &GenerateArgs) -> ReportResult<DateRange> {
        let now = self.clock.now();
        let timezone = self.jobs.config().timezone;

        match (args.start, args.end, args.report_type) {
            (Some(start), Some(end), _) => {
                DateRange::new(start, end).map_err(|e| ReportError::Validation(e.to_string()))
            }
            (None, None, ReportType::Daily) => Ok(daily_window(now, timezone)),
            (None, None, ReportType::Weekly) => Ok(weekly_window(now, timezone)),
            (None, None, ReportType::Monthly) => Ok(monthly_window(now, timezone)),
            (None, None, ReportType::Custom) => Err(ReportError::Validation(
                "custom reports need --start and --end".into(),
            )),
            _ => Err(ReportError::Validation(
                "--start and --end must be given together".into(),
            )),
        }
    }

    /// Fail reports left `generating` past the configured timeout
    pub async fn fail_abandoned(&self) -> ReportResult<u64> {
        self.generator
            .fail_abandoned(self.jobs.config().generation_timeout)
            .await
    }

    pub async fn cleanup(&self) -> ReportResult<RetentionSummary> {
        self.jobs.retention_cleanup().await
    }

    pub async fn run_job(&self, name: &str) -> ReportResult<JobRun> {
        self.scheduler.trigger(name).await
    }

    pub async fn status(&self, limit: u64) -> ReportResult<RunnerStatus> {
        let filter = ReportFilter {
            limit,
            ..ReportFilter::default()
        };
        let page = self.generator.repository().list(&filter).await?;

        Ok(RunnerStatus {
            timezone: self.scheduler.timezone().to_string(),
            jobs: self.scheduler.statuses(),
            total_reports: page.total,
            recent_reports: page.items,
        })
    }
}
