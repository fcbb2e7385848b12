//! Named recurring jobs on top of `tokio-cron-scheduler`.
//!
//! A job never overlaps itself: a trigger that fires while the previous run
//! of the same job is still going is skipped and counted, not queued.
//! Different jobs run independently of each other.
//!
//! The cron runtime pins each job to the UTC offset in effect when the job
//! was added, so a watcher rebuilds the jobs whenever the zone's offset
//! changes.

use chrono::{DateTime, Offset, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use domain_events::SharedClock;
use futures::future::BoxFuture;
use observability::reports::ReportMetrics;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_cron_scheduler::{Job, JobScheduler};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{ReportError, ReportResult};

/// When a job fires, in the scheduler's timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    Daily { hour: u32, minute: u32 },
    Weekly { weekday: Weekday, hour: u32, minute: u32 },
    Monthly { day: u32, hour: u32, minute: u32 },
    /// Every `n` minutes, aligned to the hour; `n` should divide 60
    EveryMinutes(u32),
    /// Every `n` hours, aligned to midnight; `n` should divide 24
    EveryHours(u32),
}

impl Cadence {
    /// Six-field cron expression (seconds first)
    pub fn cron(&self) -> String {
        match self {
            Cadence::Daily { hour, minute } => format!("0 {minute} {hour} * * *"),
            Cadence::Weekly {
                weekday,
                hour,
                minute,
            } => format!("0 {minute} {hour} * * {weekday}"),
            Cadence::Monthly { day, hour, minute } => format!("0 {minute} {hour} {day} * *"),
            Cadence::EveryMinutes(n) => format!("0 */{} * * * *", (*n).max(1)),
            Cadence::EveryHours(n) => format!("0 0 */{} * * *", (*n).max(1)),
        }
    }
}

pub type JobTask = Arc<dyn Fn() -> BoxFuture<'static, ReportResult<()>> + Send + Sync>;

/// Result of one trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "outcome", content = "error", rename_all = "lowercase")]
pub enum JobRun {
    Succeeded,
    Failed(String),
    /// The previous run of the same job was still going
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct JobStatus {
    pub name: String,
    pub cron: String,
    pub running: bool,
    pub runs: u64,
    pub failures: u64,
    pub skipped: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

struct JobEntry {
    name: String,
    cadence: Cadence,
    task: JobTask,
    running: AtomicBool,
    status: Mutex<JobStatus>,
}

/// Clears the running flag however the run ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl JobEntry {
    fn update(&self, change: impl FnOnce(&mut JobStatus)) {
        let mut status = self.status.lock().unwrap_or_else(|e| e.into_inner());
        change(&mut status);
    }

    async fn execute(&self, clock: &SharedClock) -> JobRun {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(job = %self.name, "Previous run still in progress, skipping trigger");
            ReportMetrics::record_job_skipped(&self.name);
            self.update(|s| s.skipped += 1);
            return JobRun::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        self.update(|s| s.last_started = Some(clock.now()));
        tracing::info!(job = %self.name, "Job started");
        let started = Instant::now();

        let result = (self.task)().await;

        let elapsed = started.elapsed();
        ReportMetrics::record_job_run(&self.name, result.is_ok(), elapsed);
        let finished = clock.now();
        match result {
            Ok(()) => {
                tracing::info!(job = %self.name, elapsed_ms = elapsed.as_millis() as u64, "Job finished");
                self.update(|s| {
                    s.runs += 1;
                    s.last_finished = Some(finished);
                    s.last_error = None;
                });
                JobRun::Succeeded
            }
            Err(e) => {
                let message = e.to_string();
                tracing::error!(job = %self.name, error = %message, "Job failed");
                self.update(|s| {
                    s.runs += 1;
                    s.failures += 1;
                    s.last_finished = Some(finished);
                    s.last_error = Some(message.clone());
                });
                JobRun::Failed(message)
            }
        }
    }
}

/// Registry of named jobs and the cron runtime that fires them
pub struct ReportScheduler {
    jobs: RwLock<BTreeMap<String, Arc<JobEntry>>>,
    timezone: Tz,
    clock: SharedClock,
    offset_check: Duration,
    reschedules: Arc<AtomicU64>,
    runtime: tokio::sync::Mutex<Option<CronRuntime>>,
}

struct CronRuntime {
    scheduler: JobScheduler,
    offset_watch: JoinHandle<()>,
}

/// Seconds east of UTC for `timezone` at `at`
fn utc_offset(timezone: Tz, at: DateTime<Utc>) -> i32 {
    timezone.offset_from_utc_datetime(&at.naive_utc()).fix().local_minus_utc()
}

impl ReportScheduler {
    pub fn new(timezone: Tz, clock: SharedClock) -> Self {
        Self {
            jobs: RwLock::new(BTreeMap::new()),
            timezone,
            clock,
            offset_check: Duration::from_secs(60),
            reschedules: Arc::new(AtomicU64::new(0)),
            runtime: tokio::sync::Mutex::new(None),
        }
    }

    /// How often the watcher compares the zone's current offset
    pub fn with_offset_check(mut self, interval: Duration) -> Self {
        self.offset_check = interval;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Times the jobs were rebuilt after an offset change
    pub fn reschedules(&self) -> u64 {
        self.reschedules.load(Ordering::Acquire)
    }

    pub fn register(&self, name: &str, cadence: Cadence, task: JobTask) -> ReportResult<()> {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if jobs.contains_key(name) {
            return Err(ReportError::Validation(format!("job {} is already registered", name)));
        }

        let entry = JobEntry {
            name: name.to_string(),
            cadence,
            task,
            running: AtomicBool::new(false),
            status: Mutex::new(JobStatus {
                name: name.to_string(),
                cron: cadence.cron(),
                ..Default::default()
            }),
        };
        jobs.insert(name.to_string(), Arc::new(entry));
        tracing::debug!(job = name, cron = %cadence.cron(), "Job registered");
        Ok(())
    }

    fn entry(&self, name: &str) -> ReportResult<Arc<JobEntry>> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.get(name)
            .cloned()
            .ok_or_else(|| ReportError::UnknownJob(name.to_string()))
    }

    pub fn job_names(&self) -> Vec<String> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.keys().cloned().collect()
    }

    /// Run a job now, under the same overlap rule as cron triggers
    pub async fn trigger(&self, name: &str) -> ReportResult<JobRun> {
        let entry = self.entry(name)?;
        Ok(entry.execute(&self.clock).await)
    }

    /// Hand every registered job to the cron runtime and start it
    pub async fn start(&self) -> ReportResult<()> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            return Ok(());
        }

        let scheduler = JobScheduler::new().await?;
        let entries: Vec<Arc<JobEntry>> = {
            let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
            jobs.values().cloned().collect()
        };

        let mut added = Vec::with_capacity(entries.len());
        add_jobs(&scheduler, &entries, self.timezone, &self.clock, &mut added).await?;
        scheduler.start().await?;
        tracing::info!(
            jobs = entries.len(),
            timezone = %self.timezone,
            "Report scheduler started"
        );

        let watch = OffsetWatch {
            scheduler: scheduler.clone(),
            entries,
            added,
            timezone: self.timezone,
            clock: self.clock.clone(),
            interval: self.offset_check,
            reschedules: self.reschedules.clone(),
        };
        *runtime = Some(CronRuntime {
            scheduler,
            offset_watch: tokio::spawn(watch.run()),
        });
        Ok(())
    }

    /// Stop firing triggers. Runs already in progress finish on their own.
    pub async fn shutdown(&self) -> ReportResult<()> {
        let mut runtime = self.runtime.lock().await;
        if let Some(CronRuntime {
            mut scheduler,
            offset_watch,
        }) = runtime.take()
        {
            offset_watch.abort();
            scheduler.shutdown().await?;
            tracing::info!("Report scheduler stopped");
        }
        Ok(())
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        let jobs = self.jobs.read().unwrap_or_else(|e| e.into_inner());
        jobs.values()
            .map(|entry| {
                let mut status = entry.status.lock().unwrap_or_else(|e| e.into_inner()).clone();
                status.running = entry.running.load(Ordering::Acquire);
                status
            })
            .collect()
    }
}

async fn add_jobs(
    scheduler: &JobScheduler,
    entries: &[Arc<JobEntry>],
    timezone: Tz,
    clock: &SharedClock,
    added: &mut Vec<Uuid>,
) -> ReportResult<()> {
    for entry in entries {
        let cron = entry.cadence.cron();
        let entry = entry.clone();
        let clock = clock.clone();
        let job = Job::new_async_tz(cron.as_str(), timezone, move |_uuid, _lock| {
            let entry = entry.clone();
            let clock = clock.clone();
            Box::pin(async move {
                entry.execute(&clock).await;
            })
        })?;
        added.push(scheduler.add(job).await?);
    }
    Ok(())
}

/// Rebuilds the cron jobs when the zone's UTC offset changes
struct OffsetWatch {
    scheduler: JobScheduler,
    entries: Vec<Arc<JobEntry>>,
    added: Vec<Uuid>,
    timezone: Tz,
    clock: SharedClock,
    interval: Duration,
    reschedules: Arc<AtomicU64>,
}

impl OffsetWatch {
    async fn run(mut self) {
        let mut current = utc_offset(self.timezone, self.clock.now());
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let offset = utc_offset(self.timezone, self.clock.now());
            if offset == current {
                continue;
            }

            tracing::info!(
                timezone = %self.timezone,
                from = current,
                to = offset,
                "UTC offset changed, rescheduling report jobs"
            );
            for id in self.added.drain(..) {
                if let Err(e) = self.scheduler.remove(&id).await {
                    tracing::warn!(job_id = %id, error = %e, "Could not remove cron job");
                }
            }
            if let Err(e) = add_jobs(
                &self.scheduler,
                &self.entries,
                self.timezone,
                &self.clock,
                &mut self.added,
            )
            .await
            {
                tracing::error!(error = %e, "Could not reschedule report jobs");
            }
            self.reschedules.fetch_add(1, Ordering::AcqRel);
            current = offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_events::{ManualClock, SystemClock};
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn scheduler() -> Arc<ReportScheduler> {
        Arc::new(ReportScheduler::new(Tz::UTC, SystemClock::shared()))
    }

    fn counting_task(counter: Arc<AtomicUsize>) -> JobTask {
        Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        })
    }

    #[test]
    fn test_cadence_cron_expressions() {
        assert_eq!(Cadence::Daily { hour: 1, minute: 0 }.cron(), "0 0 1 * * *");
        assert_eq!(
            Cadence::Weekly {
                weekday: Weekday::Mon,
                hour: 2,
                minute: 0
            }
            .cron(),
            "0 0 2 * * Mon"
        );
        assert_eq!(
            Cadence::Monthly {
                day: 1,
                hour: 3,
                minute: 0
            }
            .cron(),
            "0 0 3 1 * *"
        );
        assert_eq!(Cadence::EveryMinutes(5).cron(), "0 */5 * * * *");
        assert_eq!(Cadence::EveryHours(6).cron(), "0 0 */6 * * *");
    }

    #[tokio::test]
    async fn test_trigger_runs_and_counts() {
        let sched = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        sched
            .register("count", Cadence::EveryMinutes(5), counting_task(counter.clone()))
            .unwrap();

        assert_eq!(sched.trigger("count").await.unwrap(), JobRun::Succeeded);
        assert_eq!(sched.trigger("count").await.unwrap(), JobRun::Succeeded);

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        let status = &sched.statuses()[0];
        assert_eq!(status.runs, 2);
        assert!(status.last_finished.is_some());
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_failed_run_is_recorded() {
        let sched = scheduler();
        let task: JobTask =
            Arc::new(|| async { Err(ReportError::Render("boom".into())) }.boxed());
        sched.register("broken", Cadence::EveryHours(1), task).unwrap();

        let run = sched.trigger("broken").await.unwrap();
        assert!(matches!(run, JobRun::Failed(msg) if msg.contains("boom")));

        let status = &sched.statuses()[0];
        assert_eq!(status.failures, 1);
        assert_eq!(status.last_error.as_deref(), Some("Render error: boom"));
    }

    #[tokio::test]
    async fn test_overlapping_trigger_is_skipped_but_other_jobs_run() {
        let sched = scheduler();
        let release = Arc::new(Notify::new());
        let entered = Arc::new(Notify::new());

        let slow: JobTask = {
            let release = release.clone();
            let entered = entered.clone();
            Arc::new(move || {
                let release = release.clone();
                let entered = entered.clone();
                async move {
                    entered.notify_one();
                    release.notified().await;
                    Ok(())
                }
                .boxed()
            })
        };
        let counter = Arc::new(AtomicUsize::new(0));
        sched.register("slow", Cadence::EveryMinutes(1), slow).unwrap();
        sched
            .register("fast", Cadence::EveryMinutes(1), counting_task(counter.clone()))
            .unwrap();

        let first = tokio::spawn({
            let sched = sched.clone();
            async move { sched.trigger("slow").await }
        });
        entered.notified().await;

        assert_eq!(sched.trigger("slow").await.unwrap(), JobRun::Skipped);
        assert_eq!(sched.trigger("fast").await.unwrap(), JobRun::Succeeded);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        release.notify_one();
        assert_eq!(first.await.unwrap().unwrap(), JobRun::Succeeded);

        let slow_status = sched
            .statuses()
            .into_iter()
            .find(|s| s.name == "slow")
            .unwrap();
        assert_eq!(slow_status.skipped, 1);
        assert_eq!(slow_status.runs, 1);

        // The flag is cleared, so the next trigger runs again
        release.notify_one();
        assert_eq!(sched.trigger("slow").await.unwrap(), JobRun::Succeeded);
    }

    #[tokio::test]
    async fn test_unknown_and_duplicate_jobs() {
        let sched = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        sched
            .register("once", Cadence::EveryHours(6), counting_task(counter.clone()))
            .unwrap();

        assert!(matches!(
            sched.register("once", Cadence::EveryHours(6), counting_task(counter)),
            Err(ReportError::Validation(_))
        ));
        assert!(matches!(
            sched.trigger("missing").await,
            Err(ReportError::UnknownJob(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_utc_offset_follows_dst() {
        let berlin = chrono_tz::Europe::Berlin;
        let winter = Utc.with_ymd_and_hms(2026, 3, 29, 0, 59, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2026, 3, 29, 1, 0, 0).unwrap();

        assert_eq!(utc_offset(berlin, winter), 3600);
        assert_eq!(utc_offset(berlin, summer), 7200);
        assert_eq!(utc_offset(Tz::UTC, summer), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offset_change_rebuilds_jobs() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 29, 0, 30, 0).unwrap(),
        ));
        let sched = ReportScheduler::new(chrono_tz::Europe::Berlin, clock.clone())
            .with_offset_check(Duration::from_millis(10));
        sched
            .register(
                "daily",
                Cadence::Daily { hour: 1, minute: 0 },
                counting_task(Arc::new(AtomicUsize::new(0))),
            )
            .unwrap();

        sched.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sched.reschedules(), 0);

        clock.set(Utc.with_ymd_and_hms(2026, 3, 29, 1, 30, 0).unwrap());
        let mut reschedules = 0;
        for _ in 0..100 {
            reschedules = sched.reschedules();
            if reschedules > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(reschedules, 1);

        sched.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_and_shutdown() {
        let sched = scheduler();
        let counter = Arc::new(AtomicUsize::new(0));
        sched
            .register("daily", Cadence::Daily { hour: 1, minute: 0 }, counting_task(counter))
            .unwrap();

        sched.start().await.unwrap();
        sched.start().await.unwrap();
        sched.shutdown().await.unwrap();
        sched.shutdown().await.unwrap();
    }
}
