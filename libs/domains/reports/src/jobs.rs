use async_trait::async_trait;
use chrono::Weekday;
use core_config::{ConfigError, FromEnv, env_optional};
use domain_analytics::{AggregationEngine, DateRange};
use domain_events::{EventRepository, SessionRepository, SessionTracker, SharedClock};
use futures::{FutureExt, StreamExt};
use observability::reports::ReportMetrics;
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::config::ReportConfig;
use crate::error::ReportResult;
use crate::generator::ReportGenerator;
use crate::models::{NewReport, Report, ReportStatus, ReportType};
use crate::repository::ReportRepository;
use crate::scheduler::{Cadence, JobTask, ReportScheduler};
use crate::windows::{daily_window, monthly_window, weekly_window};

pub const DAILY_REPORT: &str = "daily-report";
pub const WEEKLY_REPORT: &str = "weekly-report";
pub const MONTHLY_REPORT: &str = "monthly-report";
pub const RETENTION_CLEANUP: &str = "retention-cleanup";
pub const ENGAGEMENT_REFRESH: &str = "engagement-refresh";
pub const SESSION_SWEEP: &str = "session-sweep";

const FANOUT_CONCURRENCY: usize = 4;
const ENGAGEMENT_WINDOW_DAYS: i64 = 30;

/// Users who receive their own weekly and monthly reports
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReportRecipients: Send + Sync {
    /// Premium users who opted in, at most `limit`
    async fn premium_opted_in(&self, limit: usize) -> ReportResult<Vec<Uuid>>;
}

/// Fixed recipient list
#[derive(Debug, Clone, Default)]
pub struct StaticRecipients(pub Vec<Uuid>);

#[async_trait]
impl ReportRecipients for StaticRecipients {
    async fn premium_opted_in(&self, limit: usize) -> ReportResult<Vec<Uuid>> {
        Ok(self.0.iter().take(limit).copied().collect())
    }
}

impl FromEnv for StaticRecipients {
    /// Comma-separated user ids in `REPORT_RECIPIENTS`; unset means nobody
    fn from_env() -> Result<Self, ConfigError> {
        let Some(raw) = env_optional("REPORT_RECIPIENTS") else {
            return Ok(Self::default());
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                Uuid::parse_str(s).map_err(|e| ConfigError::ParseError {
                    key: "REPORT_RECIPIENTS".to_string(),
                    details: format!("'{}': {}", s, e),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FanOutSummary {
    pub org_report: Report,
    pub user_completed: usize,
    pub user_failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetentionSummary {
    pub reports_deleted: u64,
    pub events_deleted: u64,
}

/// The default job set: report cadences, retention, engagement refresh and
/// the session sweep.
pub struct ReportJobs<E, S, R>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
    R: ReportRepository + 'static,
{
    generator: ReportGenerator<R>,
    engine: Arc<AggregationEngine<E, S>>,
    events: Arc<E>,
    sessions: Arc<SessionTracker<S>>,
    recipients: Arc<dyn ReportRecipients>,
    config: ReportConfig,
    clock: SharedClock,
}

impl<E, S, R> ReportJobs<E, S, R>
where
    E: EventRepository + 'static,
    S: SessionRepository + 'static,
    R: ReportRepository + 'static,
{
    pub fn new(
        generator: ReportGenerator<R>,
        engine: Arc<AggregationEngine<E, S>>,
        events: Arc<E>,
        sessions: Arc<SessionTracker<S>>,
        recipients: Arc<dyn ReportRecipients>,
        config: ReportConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            generator,
            engine,
            events,
            sessions,
            recipients,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    /// Org-wide report for the previous local day
    #[instrument(skip(self))]
    pub async fn run_daily(&self) -> ReportResult<Report> {
        let window = daily_window(self.clock.now(), self.config.timezone);
        self.generator
            .generate(NewReport::new(ReportType::Daily, window))
            .await
    }

    #[instrument(skip(self))]
    pub async fn run_weekly(&self) -> ReportResult<FanOutSummary> {
        let window = weekly_window(self.clock.now(), self.config.timezone);
        self.fan_out(ReportType::Weekly, window).await
    }

    #[instrument(skip(self))]
    pub async fn run_monthly(&self) -> ReportResult<FanOutSummary> {
        let window = monthly_window(self.clock.now(), self.config.timezone);
        self.fan_out(ReportType::Monthly, window).await
    }

    /// One org-wide report plus one per opted-in premium user, capped at the
    /// fan-out limit. Each report reaches its own terminal status.
    async fn fan_out(&self, report_type: ReportType, window: DateRange) -> ReportResult<FanOutSummary> {
        let org_report = self
            .generator
            .generate(NewReport::new(report_type, window))
            .await?;

        let limit = self.config.fanout_limit;
        let mut users = self.recipients.premium_opted_in(limit).await?;
        users.truncate(limit);

        let outcomes: Vec<ReportResult<Report>> = futures::stream::iter(users)
            .map(|user| {
                self.generator
                    .generate(NewReport::new(report_type, window).for_user(user))
            })
            .buffer_unordered(FANOUT_CONCURRENCY)
            .collect()
            .await;

        let mut user_completed = 0;
        let mut user_failed = 0;
        for outcome in outcomes {
            match outcome {
                Ok(report) if report.status == ReportStatus::Completed => user_completed += 1,
                Ok(_) => user_failed += 1,
                Err(e) => {
                    tracing::error!(error = %e, "User report could not be recorded");
                    user_failed += 1;
                }
            }
        }

        tracing::info!(
            report_type = %report_type,
            user_completed,
            user_failed,
            "Report fan-out finished"
        );
        Ok(FanOutSummary {
            org_report,
            user_completed,
            user_failed,
        })
    }

    /// Delete reports and events older than their retention windows
    #[instrument(skip(self))]
    pub async fn retention_cleanup(&self) -> ReportResult<RetentionSummary> {
        let now = self.clock.now();
        let reports_deleted = self
            .generator
            .repository()
            .delete_created_before(now - self.config.report_retention)
            .await?;
        let events_deleted = self
            .events
            .delete_before(now - self.config.event_retention)
            .await?;

        ReportMetrics::record_retention("reports", reports_deleted);
        ReportMetrics::record_retention("events", events_deleted);
        tracing::info!(reports_deleted, events_deleted, "Retention cleanup finished");

        Ok(RetentionSummary {
            reports_deleted,
            events_deleted,
        })
    }

    /// Recompute engagement scores over the last 30 days
    pub async fn refresh_engagement(&self) -> ReportResult<usize> {
        let window = DateRange::last_days(self.clock.now(), ENGAGEMENT_WINDOW_DAYS);
        Ok(self.engine.refresh_engagement_scores(window).await?)
    }

    pub async fn sweep_sessions(&self) -> ReportResult<usize> {
        let closed = self
            .sessions
            .sweep_inactive(self.config.session_inactivity)
            .await?;
        ReportMetrics::record_retention("sessions", closed as u64);
        Ok(closed)
    }

    /// Register the six default jobs
    pub fn register_defaults(self: &Arc<Self>, scheduler: &ReportScheduler) -> ReportResult<()> {
        scheduler.register(
            DAILY_REPORT,
            Cadence::Daily { hour: 1, minute: 0 },
            self.task(|jobs| async move { jobs.run_daily().await.map(drop) }.boxed()),
        )?;
        scheduler.register(
            WEEKLY_REPORT,
            Cadence::Weekly {
                weekday: Weekday::Mon,
                hour: 2,
                minute: 0,
            },
            self.task(|jobs| async move { jobs.run_weekly().await.map(drop) }.boxed()),
        )?;
        scheduler.register(
            MONTHLY_REPORT,
            Cadence::Monthly {
                day: 1,
                hour: 3,
                minute: 0,
            },
            self.task(|jobs| async move { jobs.run_monthly().await.map(drop) }.boxed()),
        )?;
        scheduler.register(
            RETENTION_CLEANUP,
            Cadence::Daily { hour: 4, minute: 0 },
            self.task(|jobs| async move { jobs.retention_cleanup().await.map(drop) }.boxed()),
        )?;
        scheduler.register(
            ENGAGEMENT_REFRESH,
            Cadence::EveryHours(6),
            self.task(|jobs| async move { jobs.refresh_engagement().await.map(drop) }.boxed()),
        )?;
        scheduler.register(
            SESSION_SWEEP,
            Cadence::EveryMinutes(5),
            self.task(|jobs| async move { jobs.sweep_sessions().await.map(drop) }.boxed()),
        )?;
        Ok(())
    }

    fn task<F>(self: &Arc<Self>, run: F) -> JobTask
    where
        F: Fn(Arc<Self>) -> futures::future::BoxFuture<'static, ReportResult<()>>
            + Send
            + Sync
            + 'static,
    {
        let jobs = self.clone();
        Arc::new(move || run(jobs.clone()))
    }
}
